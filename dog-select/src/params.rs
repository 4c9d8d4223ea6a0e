use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::{ObjectLocation, SelectConfig, SelectError, SelectQuery, SelectResult, SelectType};

/// Immutable description of one select transfer.
///
/// Built once per logical transfer; the destination key is derived here and
/// never recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct TaskParameters {
    pub source: ObjectLocation,
    pub destination: ObjectLocation,
    pub select_type: SelectType,
    pub query: SelectQuery,
    pub scratch_path: PathBuf,
    pub local_size_limit: u64,
    pub source_size_limit: u64,
    pub max_try_time: u32,
    #[serde(skip)]
    pub retry_delay: Duration,
}

impl TaskParameters {
    pub fn builder(source: ObjectLocation, query: SelectQuery) -> TaskParametersBuilder {
        TaskParametersBuilder::new(source, query)
    }

    /// Content type advertised for the uploaded artifact
    pub fn content_type(&self) -> &'static str {
        self.query.output.content_type()
    }
}

/// Builder for [`TaskParameters`]
#[derive(Debug, Clone)]
pub struct TaskParametersBuilder {
    source: ObjectLocation,
    query: SelectQuery,
    target_bucket: Option<String>,
    target_region: Option<String>,
    select_type: SelectType,
    scratch_path: Option<PathBuf>,
    config: SelectConfig,
}

impl TaskParametersBuilder {
    pub fn new(source: ObjectLocation, query: SelectQuery) -> Self {
        Self {
            source,
            query,
            target_bucket: None,
            target_region: None,
            select_type: SelectType::default(),
            scratch_path: None,
            config: SelectConfig::default(),
        }
    }

    /// Destination bucket and region. Defaults to the source's.
    pub fn target<B: Into<String>, R: Into<String>>(mut self, bucket: B, region: R) -> Self {
        self.target_bucket = Some(bucket.into());
        self.target_region = Some(region.into());
        self
    }

    pub fn select_type(mut self, select_type: SelectType) -> Self {
        self.select_type = select_type;
        self
    }

    pub fn scratch_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.scratch_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: SelectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SelectResult<TaskParameters> {
        self.config.validate()?;

        if self.source.key.is_empty() {
            return Err(SelectError::invalid("source key must not be empty"));
        }

        let extname = self.query.output.extension();
        let key = render_target_key(&self.config.target_key_template, &self.source.key, extname)?;

        let destination = ObjectLocation {
            bucket: self.target_bucket.unwrap_or_else(|| self.source.bucket.clone()),
            region: self.target_region.unwrap_or_else(|| self.source.region.clone()),
            key,
        };

        if destination == self.source {
            return Err(SelectError::invalid(format!(
                "destination {} would overwrite the source object",
                destination
            )));
        }

        let scratch_path = self.scratch_path.unwrap_or_else(|| {
            self.config
                .scratch_dir
                .join(format!("{}.{}", Uuid::new_v4().simple(), extname))
        });

        Ok(TaskParameters {
            source: self.source,
            destination,
            select_type: self.select_type,
            query: self.query,
            scratch_path,
            local_size_limit: self.config.local_size_limit,
            source_size_limit: self.config.source_size_limit,
            max_try_time: self.config.max_try_time,
            retry_delay: self.config.retry_delay,
        })
    }
}

/// Render a destination key from `template`.
///
/// `{key}` is the full source key, `{dirname}` its directory with trailing
/// slash, `{basename}` the file name without its last extension and
/// `{extname}` the output format extension. Unknown placeholders are kept.
pub fn render_target_key(template: &str, source_key: &str, extname: &str) -> SelectResult<String> {
    let (dirname, file_name) = match source_key.rfind('/') {
        Some(idx) => source_key.split_at(idx + 1),
        None => ("", source_key),
    };
    let basename = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };

    let mut rendered = String::with_capacity(template.len() + source_key.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            rendered.push_str(tail);
            rest = "";
            break;
        };

        let placeholder = &tail[..=close];
        match &placeholder[1..placeholder.len() - 1] {
            "key" => rendered.push_str(source_key),
            "dirname" => rendered.push_str(dirname),
            "basename" => rendered.push_str(basename),
            "extname" => rendered.push_str(extname),
            _ => rendered.push_str(placeholder),
        }
        rest = &tail[close + 1..];
    }
    rendered.push_str(rest);

    if rendered.is_empty() {
        return Err(SelectError::invalid(format!(
            "template {:?} renders an empty key for {:?}",
            template, source_key
        )));
    }

    Ok(rendered)
}
