use aws_config::BehaviorVersion;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;
use thesis_shared::cognito::CognitoIdentity;
use thesis_shared::config::AppConfig;
use thesis_shared::dynamo::DynamoRecordStore;
use thesis_shared::s3::S3BlobStore;
use thesis_shared::AppState;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let app_config = AppConfig::from_env();

    // Initialize AWS clients once at startup
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(endpoint) = &app_config.backend_url {
        tracing::info!("Using backend endpoint {}", endpoint);
        loader = loader.endpoint_url(endpoint);
    }
    let config = loader.load().await;

    // Custom endpoints only serve path-style bucket addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .force_path_style(app_config.backend_url.is_some())
        .build();

    let records = DynamoRecordStore::new(DynamoClient::new(&config), app_config.table_name.clone());
    let blobs = S3BlobStore::new(
        S3Client::from_conf(s3_config),
        app_config.backend_url.clone(),
    );
    let identity = CognitoIdentity::new(CognitoClient::new(&config));

    let state = AppState::new(
        Arc::new(records),
        Arc::new(blobs),
        Arc::new(identity),
        app_config,
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
