pub mod admin;
pub mod assigner;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod coordination;
pub mod error;
pub mod registry;

use std::sync::Arc;

use futures::FutureExt;

use crate::cluster::ClusterClient;
use crate::cluster::ClusterPaths;
use crate::config::{BrokerConfig, MilenaConfig};
use crate::controller::Controller;
use crate::coordination::memory::MemoryCoordinator;
use crate::error::Result;
use crate::registry::SelfRegistration;

#[macro_use]
extern crate serde_derive;

pub async fn milena<P: AsRef<std::path::Path>>(
    config_path: P,
    shutdown: (
        tokio::sync::broadcast::Sender<()>,
        tokio::sync::broadcast::Receiver<()>,
    ),
) -> Result<()> {
    let config = config::config(config_path)?;
    milena_with_config(config, shutdown).await
}

/// Runs every configured broker node against one shared in-process coordination
/// substrate. Each node registers itself, joins the controller election, and
/// reacts to membership and topic changes until shutdown.
pub async fn milena_with_config(
    config: MilenaConfig,
    shutdown: (
        tokio::sync::broadcast::Sender<()>,
        tokio::sync::broadcast::Receiver<()>,
    ),
) -> Result<()> {
    let coordinator = MemoryCoordinator::new();

    let mut nodes = Vec::new();
    for broker_config in config.brokers {
        let (task, node) = broker_node(
            coordinator.clone(),
            broker_config,
            config.paths.clone(),
            (shutdown.0.clone(), shutdown.0.subscribe()),
        )
        .remote_handle();
        tokio::spawn(task);
        nodes.push(node);
    }

    futures::future::try_join_all(nodes).await?;
    Ok(())
}

async fn broker_node(
    coordinator: MemoryCoordinator,
    broker_config: BrokerConfig,
    paths: ClusterPaths,
    shutdown: (
        tokio::sync::broadcast::Sender<()>,
        tokio::sync::broadcast::Receiver<()>,
    ),
) -> Result<()> {
    let session = coordinator.connect();
    let cluster = ClusterClient::new(Arc::new(session), paths);
    let broker = broker_config.broker();

    let registration = SelfRegistration::new(cluster.clone(), broker.clone());
    registration.register()?;

    let (controller, events_rx) = Controller::new(cluster, broker.id);
    controller.startup()?;

    let (task, registration_task) = registration
        .run((shutdown.0.clone(), shutdown.0.subscribe()))
        .remote_handle();
    tokio::spawn(task);

    let (task, controller_task) = controller
        .run(events_rx, (shutdown.0.clone(), shutdown.0.subscribe()))
        .remote_handle();
    tokio::spawn(task);

    let (_, _) = tokio::try_join!(registration_task, controller_task)?;
    Ok(())
}
