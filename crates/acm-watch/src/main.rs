// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use acm_client::{AcmEnv, ConfigClient, SubscribeOutcome};

#[tokio::main]
pub async fn main() {
    let env = AcmEnv::from_os_env();

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", env.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
    debug!("Loaded environment: {:?}", env);

    let options = match env.to_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid configuration: {e}. Shutting down.");
            return;
        }
    };

    let Some(data_id) = env.data_id.clone() else {
        error!("ACM_DATA_ID is required. Shutting down.");
        return;
    };
    let group = env.group.clone();

    let client = match ConfigClient::new(options) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to create config client: {e}. Shutting down.");
            return;
        }
    };

    match client.get_config(&data_id, &group).await {
        Ok(content) => info!(data_id = %data_id, group = %group, "initial config:\n{content}"),
        Err(e) => warn!(data_id = %data_id, group = %group, "initial fetch failed: {e}"),
    }

    let mut updates = client.watch();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let content = updates.borrow_and_update().clone();
            match content {
                Some(content) => info!("config updated:\n{content}"),
                None => debug!("config cache cleared"),
            }
        }
    });

    tokio::select! {
        outcome = client.subscribe(&data_id, &group) => match outcome {
            Ok(SubscribeOutcome::Stopped) => info!("Subscription stopped"),
            Ok(SubscribeOutcome::AlreadyPolling) => warn!("Subscription already running"),
            Err(e) => error!("Subscription failed: {e}"),
        },
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Unable to listen for shutdown signal: {e}");
            }
            client.unsubscribe();
            info!("Received shutdown signal, unsubscribed");
        }
    }
}
