use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, CompressionType as AwsCompressionType, CsvInput as AwsCsvInput,
    CsvOutput as AwsCsvOutput, ExpressionType as AwsExpressionType, FileHeaderInfo as AwsFileHeaderInfo,
    InputSerialization as AwsInputSerialization, JsonInput as AwsJsonInput, JsonOutput as AwsJsonOutput,
    JsonType as AwsJsonType, OutputSerialization as AwsOutputSerialization, ParquetInput as AwsParquetInput,
    QuoteFields as AwsQuoteFields, RequestProgress, SelectObjectContentEventStream,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::query::{InputFormat, InputSerialization, OutputSerialization};
use crate::{
    ObjectHead, ObjectLocation, ObjectStorage, SelectError, SelectQuery, SelectResult, SelectStream,
    SelectType, UploadHandlers, UploadInfo, UploadReceipt, UploadRequest, UploadSubsystem, UploadTaskId,
};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Region used when a location does not name one
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    /// Part size for multipart uploads
    pub part_size: u64,
    /// Files at least this large are uploaded in parts
    pub multipart_threshold_bytes: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
            force_path_style: false,
            part_size: 8 * 1024 * 1024, // 8MB
            multipart_threshold_bytes: 16 * 1024 * 1024, // 16MB (2x part size)
        }
    }
}

impl S3Config {
    pub fn from_env() -> SelectResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Read `S3_*` settings; credentials fall back to the default provider
    /// chain when absent.
    pub fn from_vars<I, K, V>(vars: I) -> SelectResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref().trim().to_string();
            match key.as_ref() {
                "S3_REGION" => config.region = value,
                "S3_ACCESS_KEY_ID" => config.access_key_id = Some(value),
                "S3_SECRET_ACCESS_KEY" => config.secret_access_key = Some(value),
                "S3_SESSION_TOKEN" => config.session_token = Some(value),
                "S3_ENDPOINT_URL" => config.endpoint_url = Some(value),
                "S3_FORCE_PATH_STYLE" => {
                    config.force_path_style = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
                }
                _ => {}
            }
        }

        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(SelectError::invalid(
                "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
            ));
        }
        Ok(config)
    }
}

/// Object storage client for S3-compatible services.
///
/// Implements both the read side (head, select) and a callback-style
/// uploader with per-upload abort.
#[derive(Clone)]
pub struct S3CompatibleStore {
    base: SdkConfig,
    force_path_style: bool,
    part_size: u64,
    multipart_threshold_bytes: u64,
    clients: Arc<Mutex<HashMap<String, Client>>>,
    uploads: Arc<Mutex<HashMap<UploadTaskId, CancellationToken>>>,
}

impl S3CompatibleStore {
    pub async fn new(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (config.access_key_id.clone(), config.secret_access_key.clone())
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                config.session_token.clone(),
                None,
                "dog-select",
            ));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        Self {
            base: loader.load().await,
            force_path_style: config.force_path_style,
            part_size: config.part_size.max(1),
            multipart_threshold_bytes: config.multipart_threshold_bytes,
            clients: Arc::new(Mutex::new(HashMap::new())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn from_env() -> SelectResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }

    /// Client bound to `region`, created on first use
    fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock();
        clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let mut builder = aws_sdk_s3::config::Builder::from(&self.base).force_path_style(self.force_path_style);
                if !region.is_empty() {
                    builder = builder.region(Region::new(region.to_string()));
                }
                Client::from_conf(builder.build())
            })
            .clone()
    }

    async fn transfer(&self, request: &UploadRequest, token: &CancellationToken) -> SelectResult<UploadReceipt> {
        let size_bytes = tokio::fs::metadata(&request.local_path).await?.len();
        let client = self.client(&request.destination.region);

        if size_bytes < self.multipart_threshold_bytes {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(aborted()),
                result = self.put_single(&client, request, size_bytes) => result,
            }
        } else {
            self.put_multipart(&client, request, size_bytes, token).await
        }
    }

    async fn put_single(&self, client: &Client, request: &UploadRequest, size_bytes: u64) -> SelectResult<UploadReceipt> {
        let body = AwsByteStream::from_path(&request.local_path)
            .await
            .map_err(SelectError::backend)?;

        let output = client
            .put_object()
            .bucket(&request.destination.bucket)
            .key(&request.destination.key)
            .set_content_type(request.content_type.clone())
            .body(body)
            .send()
            .await
            .map_err(SelectError::backend)?;

        let mut receipt = UploadReceipt::new(request.destination.clone(), size_bytes);
        if let Some(etag) = output.e_tag() {
            receipt = receipt.with_etag(etag);
        }
        Ok(receipt)
    }

    async fn put_multipart(
        &self,
        client: &Client,
        request: &UploadRequest,
        size_bytes: u64,
        token: &CancellationToken,
    ) -> SelectResult<UploadReceipt> {
        let created = client
            .create_multipart_upload()
            .bucket(&request.destination.bucket)
            .key(&request.destination.key)
            .set_content_type(request.content_type.clone())
            .send()
            .await
            .map_err(SelectError::backend)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| SelectError::upload_failed("S3 did not return upload_id"))?
            .to_string();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(aborted()),
            result = self.put_parts(client, request, &upload_id) => result,
        };

        let (etag, parts) = match result {
            Ok(done) => done,
            Err(error) => {
                // Best effort: orphaned parts are reclaimed by bucket lifecycle rules otherwise
                if let Err(e) = client
                    .abort_multipart_upload()
                    .bucket(&request.destination.bucket)
                    .key(&request.destination.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %request.destination.key, upload_id = %upload_id, error = %e, "failed to abort multipart upload");
                }
                return Err(error);
            }
        };

        let mut receipt = UploadReceipt::new(request.destination.clone(), size_bytes).with_upload_info(
            UploadInfo::Multipart {
                upload_id,
                part_size: self.part_size,
                parts,
            },
        );
        if let Some(etag) = etag {
            receipt = receipt.with_etag(etag);
        }
        Ok(receipt)
    }

    async fn put_parts(
        &self,
        client: &Client,
        request: &UploadRequest,
        upload_id: &str,
    ) -> SelectResult<(Option<String>, u32)> {
        let mut file = tokio::fs::File::open(&request.local_path).await?;
        let mut completed = Vec::new();
        let mut part_number = 1;

        loop {
            let mut buf = Vec::with_capacity(self.part_size as usize);
            let read = (&mut file).take(self.part_size).read_to_end(&mut buf).await?;
            if read == 0 {
                break;
            }

            let output = client
                .upload_part()
                .bucket(&request.destination.bucket)
                .key(&request.destination.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(AwsByteStream::from(buf))
                .send()
                .await
                .map_err(SelectError::backend)?;

            debug!(upload_id, part_number, bytes = read, "uploaded part");
            completed.push(
                CompletedPart::builder()
                    .e_tag(output.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        let parts = completed.len() as u32;
        let output = client
            .complete_multipart_upload()
            .bucket(&request.destination.bucket)
            .key(&request.destination.key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(SelectError::backend)?;

        Ok((output.e_tag().map(str::to_string), parts))
    }
}

fn aborted() -> SelectError {
    SelectError::upload_failed("upload aborted")
}

fn input_serialization(input: &InputSerialization) -> AwsInputSerialization {
    let mut builder = AwsInputSerialization::builder();

    builder = match &input.format {
        InputFormat::Csv(csv) => builder.csv(
            AwsCsvInput::builder()
                .file_header_info(AwsFileHeaderInfo::from(csv.file_header_info.as_str()))
                .record_delimiter(&csv.record_delimiter)
                .field_delimiter(&csv.field_delimiter)
                .quote_character(&csv.quote_character)
                .quote_escape_character(&csv.quote_escape_character)
                .set_comments(csv.comments.clone())
                .allow_quoted_record_delimiter(csv.allow_quoted_record_delimiter)
                .build(),
        ),
        InputFormat::Json(json) => builder.json(
            AwsJsonInput::builder()
                .r#type(AwsJsonType::from(json.json_type.as_str()))
                .build(),
        ),
        InputFormat::Parquet(_) => builder.parquet(AwsParquetInput::builder().build()),
    };

    if let Some(compression) = input.compression {
        builder = builder.compression_type(AwsCompressionType::from(compression.as_str()));
    }
    builder.build()
}

fn output_serialization(output: &OutputSerialization) -> AwsOutputSerialization {
    match output {
        OutputSerialization::Csv(csv) => AwsOutputSerialization::builder()
            .csv(
                AwsCsvOutput::builder()
                    .quote_fields(AwsQuoteFields::from(csv.quote_fields.as_str()))
                    .record_delimiter(&csv.record_delimiter)
                    .field_delimiter(&csv.field_delimiter)
                    .quote_character(&csv.quote_character)
                    .quote_escape_character(&csv.quote_escape_character)
                    .build(),
            )
            .build(),
        OutputSerialization::Json(json) => AwsOutputSerialization::builder()
            .json(AwsJsonOutput::builder().record_delimiter(&json.record_delimiter).build())
            .build(),
    }
}

/// Flatten select events into result bytes.
///
/// Only an `End` event marks a complete result; an event stream that closes
/// without one fails, since the records received so far may be truncated.
fn select_records<S, E>(events: S) -> SelectStream
where
    S: Stream<Item = Result<SelectObjectContentEventStream, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(SelectObjectContentEventStream::Records(records)) => {
                    if let Some(blob) = records.payload {
                        yield Ok(Bytes::from(blob.into_inner()));
                    }
                }
                Ok(SelectObjectContentEventStream::End(_)) => return,
                Ok(_) => {}
                Err(e) => {
                    yield Err(SelectError::backend(e));
                    return;
                }
            }
        }

        yield Err(SelectError::backend(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "select stream ended before its End event",
        )));
    })
}

#[async_trait]
impl ObjectStorage for S3CompatibleStore {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head_object(&self, location: &ObjectLocation) -> SelectResult<ObjectHead> {
        let output = self
            .client(&location.region)
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(SelectError::backend)?;

        Ok(ObjectHead {
            size_bytes: output.content_length().unwrap_or(0).max(0) as u64,
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            last_modified: output.last_modified().map(|dt| dt.secs()),
        })
    }

    #[instrument(skip(self, query), fields(backend = "s3"))]
    async fn open_select_stream(
        &self,
        location: &ObjectLocation,
        select_type: SelectType,
        query: &SelectQuery,
    ) -> SelectResult<SelectStream> {
        // S3 has a single select dialect; the type only matters to other vendors
        debug!(select_type = select_type.0, "opening select stream");

        let output = self
            .client(&location.region)
            .select_object_content()
            .bucket(&location.bucket)
            .key(&location.key)
            .expression(&query.expression)
            .expression_type(AwsExpressionType::from(query.expression_type.as_str()))
            .input_serialization(input_serialization(&query.input))
            .output_serialization(output_serialization(&query.output))
            .request_progress(RequestProgress::builder().enabled(query.request_progress).build())
            .send()
            .await
            .map_err(SelectError::backend)?;

        let events = stream::unfold(output.payload, |mut payload| async move {
            match payload.recv().await {
                Ok(Some(event)) => Some((Ok(event), payload)),
                Ok(None) => None,
                Err(e) => Some((Err(e), payload)),
            }
        });

        Ok(select_records(events))
    }
}

impl UploadSubsystem for S3CompatibleStore {
    fn start_upload(&self, request: UploadRequest, handlers: UploadHandlers) {
        let id = UploadTaskId::new();
        let token = CancellationToken::new();
        self.uploads.lock().insert(id.clone(), token.clone());

        let store = self.clone();
        tokio::spawn(async move {
            let UploadHandlers {
                on_task_ready,
                on_finish,
            } = handlers;
            on_task_ready(id.clone());

            let result = store.transfer(&request, &token).await;
            store.uploads.lock().remove(&id);

            match &result {
                Ok(receipt) => info!(upload_id = %id, key = %receipt.destination.key, size = receipt.size_bytes, "upload finished"),
                Err(e) => warn!(upload_id = %id, error = %e, "upload failed"),
            }
            on_finish(result);
        });
    }

    fn abort_upload(&self, id: &UploadTaskId) {
        if let Some(token) = self.uploads.lock().get(id) {
            token.cancel();
        }
    }
}
