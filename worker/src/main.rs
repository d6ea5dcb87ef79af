//! Deployment-processing worker: pulls jobs off a priority/entity-typed
//! queue fanout, drives a local asset-optimization engine through Scene or
//! Wearable/Emote pipelines, and uploads the results to storage. Also
//! supports two one-shot CLI modes (`--entityId`, `--profile`) that bypass
//! the daemon loop.

mod admin;
mod cli;
mod config;
mod dispatcher;
mod error;
mod pipeline;

use std::sync::Arc;

use envconfig::Envconfig;
use health::HealthRegistry;
use worker_common::engine::EngineClient;
use worker_common::model::{EntityDefinition, EntityType, Job};
use worker_common::monitor::MonitoringReporter;
use worker_common::notify::{MockPublisher, NotificationPublisher, SnsPublisher};
use worker_common::queue::{CloudQueue, InMemoryQueue, Queue};
use worker_common::storage::{LocalStorage, ObjectStorage, Storage};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::WorkerError;
use crate::pipeline::PipelineContext;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("invalid configuration");
    let process_method = config
        .process_method()
        .map_err(WorkerError::UnknownProcessMethod)?;

    let liveness = HealthRegistry::new("liveness");
    let worker_liveness = liveness
        .register("dispatcher".to_owned(), time::Duration::seconds(120))
        .await;

    let aws_config = build_aws_config(&config).await;

    let fetcher = Arc::new(worker_common::fetcher::Fetcher::new(config.fetch_config()));
    let storage = build_storage(&config, &aws_config);
    let notifier = build_notifier(&config, &aws_config);
    let queue = build_queue(&config, &aws_config);

    let engine = Arc::new(EngineClient::new(worker_common::engine::EngineConfig {
        base_url: config.asset_server_url.clone(),
        port: config.asset_server_port,
        process_name: config.asset_server_process_name.clone(),
    }));

    let monitor = MonitoringReporter::new(
        config.process_method.clone(),
        config.monitoring_url.clone(),
        config.monitoring_secret.clone(),
    );
    monitor.spawn_heartbeat_loop();

    let ctx = PipelineContext {
        engine: engine.clone(),
        storage: storage.clone(),
        fetcher: fetcher.clone(),
        monitor: monitor.clone(),
        notifier,
        scene_wait_timeout: config.asset_server_timeout_ms.0,
        concurrent_bundles: config.asset_server_concurrent_bundles,
        profile_concurrent_limit: config.profile_concurrent_limit,
        max_gltf_count: config.max_gltf_count,
        max_content_size_bytes: config.max_content_size_bytes,
    };

    let cli = cli::Cli::parse(std::env::args().skip(1));

    if let Some(address) = &cli.profile_address {
        let content_server = "https://peer.decentraland.org/content".to_owned();
        if let Err(e) = pipeline::profile::run(&ctx, address, &content_server).await {
            tracing::error!("profile expansion failed: {}", e);
        }
        return Ok(());
    }

    if let Some(entity_id) = &cli.entity_id {
        let content_server = "https://peer.decentraland.org/content".to_owned();
        match resolve_entity_id(&fetcher, &content_server, entity_id).await {
            Ok(resolved) => {
                let job = Job {
                    entity_id: resolved,
                    entity_type: EntityType::Scene,
                    content_server_urls: vec![content_server],
                    profile_data: None,
                };
                if let Err(e) = queue.publish(&job, false).await {
                    tracing::error!("failed to enqueue resolved entity: {}", e);
                }
            }
            Err(e) => tracing::error!("failed to resolve entity id {}: {}", entity_id, e),
        }
    }

    let admin_state = admin::AdminState {
        queue: queue.clone(),
    };
    let router = admin::router(liveness, admin_state, &config.local_storage_dir);
    let bind = config.bind();
    tokio::spawn(async move {
        if let Err(e) = worker_common::metrics::serve(router, &bind).await {
            tracing::error!("admin server exited: {}", e);
        }
    });

    let dispatcher = Arc::new(Dispatcher::new(process_method, ctx));
    dispatcher::run(queue, dispatcher, worker_liveness).await;

    Ok(())
}

async fn resolve_entity_id(
    fetcher: &worker_common::fetcher::Fetcher,
    content_server: &str,
    entity_id: &str,
) -> anyhow::Result<String> {
    #[derive(serde::Serialize)]
    struct Req<'a> {
        pointers: &'a [String],
    }

    let pointers = vec![entity_id.to_owned()];
    let body = serde_json::to_vec(&Req { pointers: &pointers })?;
    let url = format!("{}/entities/active", content_server.trim_end_matches('/'));

    let response = fetcher
        .fetch(
            &url,
            worker_common::fetcher::FetchOptions {
                method: Some(reqwest::Method::POST),
                headers: vec![("content-type".to_owned(), "application/json".to_owned())],
                body: Some(body),
                timeout: None,
            },
        )
        .await?;

    let entities: Vec<EntityDefinition> = response.json().await?;
    Ok(entities
        .into_iter()
        .next()
        .map(|e| e.id)
        .unwrap_or_else(|| entity_id.to_owned()))
}

async fn build_aws_config(config: &Config) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(config.aws_region.clone()));

    if let Some(endpoint) = &config.aws_endpoint {
        loader = loader.endpoint_url(endpoint.clone());
    }

    loader.load().await
}

fn build_storage(config: &Config, aws_config: &aws_config::SdkConfig) -> Arc<dyn Storage> {
    match &config.bucket {
        Some(bucket) => {
            let mut s3_builder = aws_sdk_s3::config::Builder::from(aws_config);
            if let Some(endpoint) = &config.s3_endpoint {
                s3_builder = s3_builder.endpoint_url(endpoint.clone());
            }
            if let (Some(key_id), Some(secret)) =
                (&config.s3_access_key_id, &config.s3_secret_access_key)
            {
                s3_builder = s3_builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "static",
                ));
            }
            let client = aws_sdk_s3::Client::from_conf(s3_builder.build());
            Arc::new(ObjectStorage::new(client, bucket.clone(), config.s3_prefix.clone()))
        }
        None => Arc::new(LocalStorage::new(config.local_storage_dir.clone())),
    }
}

fn build_notifier(
    config: &Config,
    aws_config: &aws_config::SdkConfig,
) -> Arc<dyn NotificationPublisher> {
    match &config.sns_arn {
        Some(arn) => {
            let mut sns_builder = aws_sdk_sns::config::Builder::from(aws_config);
            if let Some(endpoint) = &config.sns_endpoint {
                sns_builder = sns_builder.endpoint_url(endpoint.clone());
            }
            let client = aws_sdk_sns::Client::from_conf(sns_builder.build());
            Arc::new(SnsPublisher::new(client, arn.clone()))
        }
        None => Arc::new(MockPublisher),
    }
}

fn build_queue(config: &Config, aws_config: &aws_config::SdkConfig) -> Arc<dyn Queue> {
    match &config.task_queue {
        Some(task_queue) => {
            let client = aws_sdk_sqs::Client::new(aws_config);
            Arc::new(CloudQueue::new(
                client,
                config.priority_task_queue.clone(),
                task_queue.clone(),
                config.wearable_task_queue.clone(),
                config.emote_task_queue.clone(),
            ))
        }
        None => Arc::new(InMemoryQueue::new()),
    }
}
