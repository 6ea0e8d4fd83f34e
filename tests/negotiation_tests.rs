//! Integration tests for caps negotiation and configuration.
//!
//! Stages are driven against scripted neighbours to check how the chosen
//! output caps, the processing mode and the allocation binding follow from
//! templates and peer answers.

mod common;

use common::{AllocationAnswer, FakePeer};
use parallax_transform::buffer::Buffer;
use parallax_transform::element::{PadDirection, TransformImpl, TransformMode};
use parallax_transform::error::{Error, NegotiationError, Result};
use parallax_transform::format::{Caps, Structure, Value};
use parallax_transform::metadata::Metadata;
use parallax_transform::transform::{PoolSource, Stage, StageConfig, link};
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Test transforms
// ============================================================================

/// Relabels the sample rate; output rates are limited to [8000, 48000].
#[derive(Default)]
struct RateTag {
    set_caps_calls: AtomicUsize,
}

impl TransformImpl for RateTag {
    const MODE: TransformMode = TransformMode::Both;
    const PASSTHROUGH_ON_SAME_CAPS: bool = true;

    fn src_template(&self) -> Caps {
        Caps::builder("audio/x-raw").field("rate", 8000..=48000).build()
    }

    fn transform_structure(&self, _direction: PadDirection, s: &Structure) -> Vec<Structure> {
        let mut open = s.clone();
        open.set("rate", 1..=192000);
        vec![open]
    }

    fn set_caps(&self, _incaps: &Caps, _outcaps: &Caps) -> Result<()> {
        self.set_caps_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transform_ip(&self, _buffer: &mut Buffer) -> Result<()> {
        Ok(())
    }

    fn transform(&self, input: &Buffer, output: &mut Buffer) -> Result<()> {
        output
            .data_mut()
            .ok_or_else(|| Error::TransformFailed("not writable".into()))?
            .copy_from_slice(input.as_bytes());
        Ok(())
    }
}

/// Refuses any configuration that changes the rate.
struct SameRateOnly;

impl TransformImpl for SameRateOnly {
    const MODE: TransformMode = TransformMode::Both;
    const PASSTHROUGH_ON_SAME_CAPS: bool = true;

    fn src_template(&self) -> Caps {
        Caps::builder("audio/x-raw").field("rate", 8000..=48000).build()
    }

    fn transform_structure(&self, _direction: PadDirection, s: &Structure) -> Vec<Structure> {
        let mut open = s.clone();
        open.set("rate", 1..=192000);
        vec![open]
    }

    fn set_caps(&self, incaps: &Caps, outcaps: &Caps) -> Result<()> {
        if incaps.is_equal(outcaps) {
            Ok(())
        } else {
            Err(Error::InvalidInput("rate conversion unsupported".into()))
        }
    }
}

/// Adds a layout field to otherwise fixed caps.
struct Layout;

impl TransformImpl for Layout {
    const MODE: TransformMode = TransformMode::AlwaysInPlace;

    fn fixate_caps(&self, _direction: PadDirection, _reference: &Caps, candidate: Caps) -> Caps {
        let mut candidate = candidate;
        if let Some(s) = candidate.make_mut().first_mut() {
            if !s.has_field("layout") {
                s.set("layout", "interleaved");
            }
        }
        candidate
    }
}

/// Converts to one of two fixed output rates.
struct TwoRates;

impl TransformImpl for TwoRates {
    const MODE: TransformMode = TransformMode::NeverInPlace;

    fn src_template(&self) -> Caps {
        Caps::builder("audio/x-raw")
            .field("rate", Value::list([22050i64, 48000]))
            .build()
    }

    fn transform_structure(&self, _direction: PadDirection, s: &Structure) -> Vec<Structure> {
        let mut open = s.clone();
        open.set("rate", 1..=192000);
        vec![open]
    }

    fn transform(&self, _input: &Buffer, _output: &mut Buffer) -> Result<()> {
        Ok(())
    }
}

/// Produces caps with a field no value can satisfy.
struct Unfixable;

impl TransformImpl for Unfixable {
    const MODE: TransformMode = TransformMode::NeverInPlace;

    fn transform_caps(&self, _direction: PadDirection, _caps: &Caps, _filter: Option<&Caps>) -> Caps {
        Caps::new(Structure::new("test/x").with("x", Value::list(Vec::<i64>::new())))
    }
}

fn rate(r: i64) -> Caps {
    Caps::builder("audio/x-raw").field("rate", r).build()
}

fn rate_range(min: i64, max: i64) -> Caps {
    Caps::builder("audio/x-raw").field("rate", min..=max).build()
}

// ============================================================================
// Peer-driven outcomes
// ============================================================================

#[test]
fn test_accepted_input_becomes_passthrough() {
    common::init_tracing();
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::new(rate_range(8000, 48000));
    peer.attach_downstream(&stage);

    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();

    assert!(stage.is_negotiated());
    assert!(stage.is_passthrough());
    assert_eq!(stage.sink_caps(), Some(rate(44100)));
    assert_eq!(stage.src_caps(), Some(rate(44100)));

    let binding = stage.allocation();
    assert!(!binding.is_bound());
    assert_eq!(binding.source(), PoolSource::None);
    assert_eq!(peer.allocation_queries(), 0);
    assert_eq!(stage.imp().set_caps_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_peer_constrains_output() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::new(rate(48000));
    peer.attach_downstream(&stage);

    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();

    assert_eq!(stage.src_caps(), Some(rate(48000)));
    assert!(!stage.is_passthrough());
    assert!(!stage.is_in_place());
    // Size unknown and nothing proposed: outputs are allocated ad hoc.
    assert_eq!(peer.allocation_queries(), 1);
    assert!(!stage.allocation().is_bound());

    let out = stage
        .process(Buffer::from_slice(&[1, 2, 3, 4], Metadata::with_sequence(9)))
        .unwrap()
        .unwrap();
    assert_eq!(out.as_bytes(), &[1, 2, 3, 4]);
    assert_eq!(out.metadata().sequence, 9);
}

#[test]
fn test_out_of_template_input_is_fixated_nearest() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);

    stage.negotiate(PadDirection::Input, &rate(96000)).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(48000)));

    stage.negotiate(PadDirection::Input, &rate(4000)).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(8000)));
}

#[test]
fn test_rate_list_fixates_to_first_entry() {
    let stage = Stage::new(TwoRates, StageConfig::default());

    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(22050)));
    assert!(!stage.is_passthrough());
}

#[test]
fn test_peer_rejection_keeps_previous_caps() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();

    peer.set_accept(false);
    let err = stage.negotiate(PadDirection::Input, &rate(22050)).unwrap_err();
    assert!(matches!(err, NegotiationError::PeerRejected { .. }));

    assert!(!stage.is_negotiated());
    assert_eq!(stage.sink_caps(), Some(rate(44100)));
    assert_eq!(stage.src_caps(), Some(rate(44100)));
    assert!(matches!(
        stage.process(Buffer::from_slice(&[0], Metadata::new())),
        Err(Error::NotNegotiated)
    ));
}

#[test]
fn test_empty_peer_answer_is_no_transform() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::new(Caps::builder("video/x-raw").build());
    peer.attach_downstream(&stage);

    let err = stage.negotiate(PadDirection::Input, &rate(44100)).unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::NoTransformPossible {
            direction: PadDirection::Input,
            ..
        }
    ));
}

#[test]
fn test_output_originated_negotiation() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let upstream = FakePeer::any();
    upstream.attach_upstream(&stage);

    stage.negotiate(PadDirection::Output, &rate(22050)).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(22050)));
    assert_eq!(stage.sink_caps(), Some(rate(22050)));
    assert!(stage.is_passthrough());
}

#[test]
fn test_negotiating_peer_is_a_no_op() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);
    peer.set_negotiating(true);

    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    assert!(!stage.is_negotiated());
    assert_eq!(stage.src_caps(), None);
    assert_eq!(peer.accept_calls(), 0);
}

#[test]
fn test_renegotiation_is_idempotent() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::new(rate(32000));
    peer.attach_downstream(&stage);

    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    let first = (stage.src_caps(), stage.is_passthrough(), stage.is_in_place());
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    let second = (stage.src_caps(), stage.is_passthrough(), stage.is_in_place());
    assert_eq!(first, second);
}

// ============================================================================
// Fixation
// ============================================================================

#[test]
fn test_enriched_fixed_caps_are_rechecked() {
    let stage = Stage::new(Layout, StageConfig::default());
    stage.negotiate(PadDirection::Input, &rate(48000)).unwrap();
    let out = stage.src_caps().unwrap();
    assert_eq!(out.structure(0).unwrap().get_str("layout"), Some("interleaved"));

    let stage = Stage::new(Layout, StageConfig::default());
    let peer = FakePeer::new(
        Caps::builder("audio/x-raw")
            .field("rate", 48000)
            .field("layout", "planar")
            .build(),
    );
    peer.attach_downstream(&stage);
    let err = stage.negotiate(PadDirection::Input, &rate(48000)).unwrap_err();
    assert!(matches!(err, NegotiationError::PeerRejected { .. }));
}

#[test]
fn test_unfixable_candidate() {
    let stage = Stage::new(Unfixable, StageConfig::default());
    let caps = Caps::builder("test/x").field("x", 1).build();
    let err = stage.negotiate(PadDirection::Input, &caps).unwrap_err();
    assert!(matches!(err, NegotiationError::CouldNotFixate { .. }));
    assert!(!stage.is_negotiated());
}

// ============================================================================
// Configure
// ============================================================================

#[test]
fn test_configure_failure_restores_flags() {
    let stage = Stage::new(SameRateOnly, StageConfig::default());
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    assert!(stage.is_passthrough());
    assert!(stage.is_in_place());

    let err = stage.negotiate(PadDirection::Input, &rate(96000)).unwrap_err();
    assert!(matches!(err, NegotiationError::ConfigureFailed { .. }));
    assert!(!stage.is_negotiated());
    assert!(stage.is_passthrough());
    assert!(stage.is_in_place());
    assert_eq!(stage.src_caps(), Some(rate(44100)));
}

#[test]
fn test_delayed_configure_runs_on_first_buffer() {
    let stage = Stage::new(
        RateTag::default(),
        StageConfig::default().with_delay_configure(true),
    );
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    assert_eq!(stage.imp().set_caps_calls.load(Ordering::SeqCst), 0);

    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert_eq!(stage.imp().set_caps_calls.load(Ordering::SeqCst), 1);

    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert_eq!(stage.imp().set_caps_calls.load(Ordering::SeqCst), 1);

    stage.reconfigure();
    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert_eq!(stage.imp().set_caps_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reconfigure_src_follows_new_peer_caps() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();
    assert!(stage.is_passthrough());

    peer.set_caps(rate(16000));
    peer.set_allocation(AllocationAnswer::Empty);
    stage.reconfigure_src();
    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();

    assert_eq!(stage.src_caps(), Some(rate(16000)));
    assert!(!stage.is_passthrough());
}

#[test]
fn test_reconfigure_survives_negotiating_peer() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();

    peer.set_caps(rate(16000));
    peer.set_allocation(AllocationAnswer::Empty);
    peer.set_negotiating(true);
    stage.reconfigure_src();
    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(44100)));
    assert!(stage.src_pad().needs_reconfigure());

    peer.set_negotiating(false);
    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert_eq!(stage.src_caps(), Some(rate(16000)));
    assert!(!stage.src_pad().needs_reconfigure());
}

#[test]
fn test_failed_reconfigure_is_retried_on_next_buffer() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::any();
    peer.attach_downstream(&stage);
    stage.negotiate(PadDirection::Input, &rate(44100)).unwrap();

    peer.set_caps(rate(16000));
    peer.set_allocation(AllocationAnswer::Empty);
    peer.set_accept(false);
    stage.reconfigure_src();
    assert!(stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).is_err());
    assert!(!stage.is_negotiated());
    assert!(stage.src_pad().needs_reconfigure());

    peer.set_accept(true);
    stage.process(Buffer::from_slice(&[0; 4], Metadata::new())).unwrap();
    assert!(stage.is_negotiated());
    assert_eq!(stage.src_caps(), Some(rate(16000)));
    assert!(!stage.src_pad().needs_reconfigure());
}

// ============================================================================
// Caps queries and suggestions
// ============================================================================

#[test]
fn test_query_caps_maps_peer_caps() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let peer = FakePeer::new(rate(32000));
    peer.attach_downstream(&stage);

    // Passthrough preference offers the peer's format first.
    let caps = stage.query_caps(PadDirection::Input, None);
    assert_eq!(caps.structure(0).unwrap().get_int("rate"), Some(32000));
    assert!(stage.accept_caps(PadDirection::Input, &rate(96000)));

    stage.set_prefer_passthrough(false);
    let caps = stage.query_caps(PadDirection::Input, None);
    assert_eq!(caps.len(), 1);
    assert_eq!(caps.structure(0).unwrap().get_int("rate"), None);
}

#[test]
fn test_suggestion_asks_upstream_and_leads_queries() {
    let stage = Stage::new(RateTag::default(), StageConfig::default());
    let upstream = FakePeer::any();
    upstream.attach_upstream(&stage);

    assert!(stage.suggest(Some(rate(32000)), Some(1024)));
    assert_eq!(upstream.events(), vec!["reconfigure"]);
    assert_eq!(stage.suggested_size(), Some(1024));

    let caps = stage.query_caps(PadDirection::Input, None);
    assert_eq!(caps.structure(0).unwrap().get_int("rate"), Some(32000));
}

#[test]
fn test_linked_stages_negotiate_through() {
    let first = Stage::new(RateTag::default(), StageConfig::default().with_name("first"));
    let second = Stage::new(RateTag::default(), StageConfig::default().with_name("second"));
    link(&first, &second);

    first.negotiate(PadDirection::Input, &rate(96000)).unwrap();
    let mid = first.src_caps().unwrap();
    assert_eq!(mid, rate(48000));

    second.negotiate(PadDirection::Input, &mid).unwrap();
    assert!(second.is_passthrough());
    assert_eq!(second.src_caps(), Some(rate(48000)));
}
