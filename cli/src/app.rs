//! Process composition: store and node client first, then processors on the
//! bus, then the monitor and the HTTP state on top.

use std::sync::Arc;

use tracing::info;

use anchorindex_api::{AnchorService, AppState};
use anchorindex_core::{BlockMonitor, ChainClient, IndexBus, IndexerError, KeyValueStore};
use anchorindex_node::NodeClient;
use anchorindex_processors::{
    AnchorIndexer, AssociationIndexer, DidResolver, GeneratorStatsEngine, PublicKeyIndexer,
    SupplyTracker, VerificationMethodIndexer,
};
use anchorindex_storage::StoreConnector;

use crate::config::RunArgs;

pub struct Indexer {
    pub monitor: Arc<BlockMonitor>,
    pub state: AppState,
    pub subscribers: usize,
}

pub async fn compose(args: &RunArgs) -> Result<Indexer, IndexerError> {
    let store = StoreConnector::default().connect(&args.store.store).await?;
    let chain: Arc<dyn ChainClient> = Arc::new(NodeClient::new(args.node.node_config())?);
    Ok(compose_with(args, store, chain))
}

pub fn compose_with(
    args: &RunArgs,
    store: Arc<dyn KeyValueStore>,
    chain: Arc<dyn ChainClient>,
) -> Indexer {
    let toggles = args.processors.toggles();
    let mut bus = IndexBus::new();

    let anchors = Arc::new(AnchorIndexer::new(store.clone()));
    if toggles.anchors {
        bus.subscribe_transaction(anchors.clone());
    }

    let public_keys = Arc::new(PublicKeyIndexer::new(store.clone(), chain.clone()));
    if toggles.public_keys {
        bus.subscribe_transaction(public_keys.clone());
    }

    let mut state = AppState::new(Arc::new(AnchorService::new(chain.clone(), anchors)));

    if toggles.identity {
        let associations = Arc::new(AssociationIndexer::new(store.clone(), public_keys.clone()));
        let methods = Arc::new(VerificationMethodIndexer::new(store.clone(), public_keys.clone()));
        bus.subscribe_transaction(associations.clone());
        bus.subscribe_transaction(methods.clone());
        state = state
            .associations(associations)
            .did(Arc::new(DidResolver::new(public_keys, methods)));
    }

    if toggles.generators {
        let engine = Arc::new(GeneratorStatsEngine::new(args.generator_config(), chain.clone()));
        bus.subscribe_block(engine.clone());
        bus.subscribe_sync(engine.clone());
        state = state.generators(engine);
    }

    if toggles.supply {
        let tracker = Arc::new(SupplyTracker::new(args.supply_config(), store.clone(), chain.clone()));
        bus.subscribe_block(tracker.clone());
        state = state.supply(tracker);
    }

    if let Some(secret) = &args.api_secret {
        state = state.api_secret(secret.clone());
    }

    let subscribers = bus.subscriber_count();
    info!(
        ?toggles,
        subscribers,
        store = %store.target(),
        "indexer composed"
    );

    let monitor = Arc::new(BlockMonitor::new(args.monitor_config(), chain, store, Arc::new(bus)));
    Indexer {
        monitor,
        state,
        subscribers,
    }
}
