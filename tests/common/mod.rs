//! Shared fakes for the integration suites.

#![allow(dead_code)]

use parallax_transform::element::{
    AllocationParams, AllocationQuery, PadDirection, PadPeer, PoolProposal, TransformImpl,
};
use parallax_transform::event::{QosMessage, QosObserver, UpstreamEvent};
use parallax_transform::format::Caps;
use parallax_transform::memory::BufferPool;
use parallax_transform::transform::Stage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

/// Install a `tracing` subscriber once, filtered by `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// How a [`FakePeer`] answers allocation queries.
#[derive(Clone, Default)]
pub enum AllocationAnswer {
    /// The query fails.
    #[default]
    Unanswered,
    /// Answered without any pool or size.
    Empty,
    /// A sizing hint without a pool.
    Sizes { size: usize, min: usize, max: usize },
    /// A sizing hint plus a required alignment.
    Aligned { size: usize, align: usize },
    /// A concrete pool.
    Pool(Arc<dyn BufferPool>),
}

/// A scriptable neighbour.
pub struct FakePeer {
    caps: Mutex<Caps>,
    accept: AtomicBool,
    negotiating: AtomicBool,
    allocation: Mutex<AllocationAnswer>,
    events: Mutex<Vec<&'static str>>,
    accept_calls: AtomicUsize,
    allocation_queries: AtomicUsize,
}

impl FakePeer {
    /// A peer that handles exactly `caps`.
    pub fn new(caps: Caps) -> Arc<Self> {
        Arc::new(Self {
            caps: Mutex::new(caps),
            accept: AtomicBool::new(true),
            negotiating: AtomicBool::new(false),
            allocation: Mutex::new(AllocationAnswer::default()),
            events: Mutex::new(Vec::new()),
            accept_calls: AtomicUsize::new(0),
            allocation_queries: AtomicUsize::new(0),
        })
    }

    /// A peer that handles anything.
    pub fn any() -> Arc<Self> {
        Self::new(Caps::new_any())
    }

    pub fn set_caps(&self, caps: Caps) {
        *self.caps.lock().unwrap() = caps;
    }

    /// Make every accept query fail regardless of caps.
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn set_negotiating(&self, negotiating: bool) {
        self.negotiating.store(negotiating, Ordering::SeqCst);
    }

    pub fn set_allocation(&self, answer: AllocationAnswer) {
        *self.allocation.lock().unwrap() = answer;
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }

    pub fn allocation_queries(&self) -> usize {
        self.allocation_queries.load(Ordering::SeqCst)
    }

    /// Link as the downstream neighbour of `stage`.
    pub fn attach_downstream<T: TransformImpl>(self: &Arc<Self>, stage: &Stage<T>) {
        let peer: Arc<dyn PadPeer> = self.clone();
        stage.set_src_peer(&peer, PadDirection::Input);
    }

    /// Link as the upstream neighbour of `stage`.
    pub fn attach_upstream<T: TransformImpl>(self: &Arc<Self>, stage: &Stage<T>) {
        let peer: Arc<dyn PadPeer> = self.clone();
        stage.set_sink_peer(&peer, PadDirection::Output);
    }
}

impl PadPeer for FakePeer {
    fn query_caps(&self, _pad: PadDirection, filter: Option<&Caps>) -> Caps {
        let caps = self.caps.lock().unwrap().clone();
        match filter {
            Some(filter) => filter.intersect(&caps),
            None => caps,
        }
    }

    fn accept_caps(&self, _pad: PadDirection, caps: &Caps) -> bool {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        self.accept.load(Ordering::SeqCst) && caps.is_subset(&self.caps.lock().unwrap())
    }

    fn is_negotiating(&self, _pad: PadDirection) -> bool {
        self.negotiating.load(Ordering::SeqCst)
    }

    fn propose_allocation(&self, _pad: PadDirection, query: &mut AllocationQuery) -> bool {
        self.allocation_queries.fetch_add(1, Ordering::SeqCst);
        match self.allocation.lock().unwrap().clone() {
            AllocationAnswer::Unanswered => false,
            AllocationAnswer::Empty => true,
            AllocationAnswer::Sizes { size, min, max } => {
                query.add_pool(PoolProposal::sizes(size, min, max));
                true
            }
            AllocationAnswer::Aligned { size, align } => {
                query.params = Some(AllocationParams { align });
                query.add_pool(PoolProposal::sizes(size, 2, 0));
                true
            }
            AllocationAnswer::Pool(pool) => {
                let config = pool.config();
                query.add_pool(PoolProposal::with_pool(
                    pool,
                    config.size,
                    config.min_buffers,
                    config.max_buffers,
                ));
                true
            }
        }
    }

    fn upstream_event(&self, _pad: PadDirection, event: UpstreamEvent) -> bool {
        self.events.lock().unwrap().push(event.name());
        true
    }
}

/// Collects QoS drop reports.
#[derive(Default)]
pub struct RecordingObserver {
    messages: Mutex<Vec<QosMessage>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<QosMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl QosObserver for RecordingObserver {
    fn post_qos(&self, message: &QosMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }
}
