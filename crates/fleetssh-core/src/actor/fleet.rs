//! `FleetActor`: serialised access to one `ParallelClient`
//!
//! Callers on many tasks send messages; the actor runs one fan-out at a
//! time against its client and closes every session when it stops.

use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::info;

use crate::client::ParallelClient;
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::factory::{DefaultTransportFactory, TransportFactory};
use crate::message::{
    Connect, DeleteDir, DeleteFile, FleetInventory, ListHosts, MakeDir, PutFiles, RunCommand,
};
use crate::record::{CommandRecord, ConnectRecord, FleetResults, Upload};

/// Arguments for spawning a `FleetActor`
pub struct FleetActorArgs {
    /// Client configuration
    pub config: ClientConfig,
    /// Factory for per-host transports
    pub factory: Arc<dyn TransportFactory>,
}

impl FleetActorArgs {
    /// Arguments using SSH and local transports
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            factory: Arc::new(DefaultTransportFactory),
        }
    }
}

/// Actor owning a `ParallelClient`
pub struct FleetActor {
    client: ParallelClient,
}

impl FleetActor {
    #[must_use]
    pub fn client(&self) -> &ParallelClient {
        &self.client
    }
}

impl Actor for FleetActor {
    type Args = FleetActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            id = %actor_ref.id(),
            hosts = args.config.hosts.len(),
            "FleetActor starting"
        );

        let client = ParallelClient::new(args.config, args.factory).await?;

        Ok(Self { client })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "FleetActor stopping");
        self.client.close().await;
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Connect> for FleetActor {
    type Reply = Result<FleetResults<ConnectRecord>, CoreError>;

    async fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.client.connect(msg.raise_on_error).await
    }
}

impl Message<RunCommand> for FleetActor {
    type Reply = Result<FleetResults<CommandRecord>, CoreError>;

    async fn handle(
        &mut self,
        msg: RunCommand,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self
            .client
            .run(&msg.cmd, msg.timeout, msg.cwd.as_deref())
            .await)
    }
}

impl Message<PutFiles> for FleetActor {
    type Reply = Result<FleetResults<Upload>, CoreError>;

    async fn handle(
        &mut self,
        msg: PutFiles,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.client
            .put(
                &msg.local_path,
                &msg.remote_path,
                msg.mode,
                msg.mirror_local_mode,
            )
            .await
    }
}

impl Message<MakeDir> for FleetActor {
    type Reply = Result<FleetResults<()>, CoreError>;

    async fn handle(&mut self, msg: MakeDir, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.client.mkdir(&msg.path).await)
    }
}

impl Message<DeleteFile> for FleetActor {
    type Reply = Result<FleetResults<bool>, CoreError>;

    async fn handle(
        &mut self,
        msg: DeleteFile,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.client.delete_file(&msg.path).await)
    }
}

impl Message<DeleteDir> for FleetActor {
    type Reply = Result<FleetResults<bool>, CoreError>;

    async fn handle(
        &mut self,
        msg: DeleteDir,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self
            .client
            .delete_dir(&msg.path, msg.force, msg.timeout)
            .await)
    }
}

impl Message<ListHosts> for FleetActor {
    type Reply = FleetInventory;

    async fn handle(
        &mut self,
        _msg: ListHosts,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        FleetInventory {
            hosts: self.client.summaries(),
        }
    }
}
