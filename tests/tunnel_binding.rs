//! Integration tests for port binding between components.

mod common;

use common::*;
use mmpipe::Error;
use mmpipe::component::{Component, ComponentState, tunnel, untunnel};
use mmpipe::components::{
    AUDIO_DECODER_OUTPUT_PORT, AudioDecoderComponent, MUXER_AUDIO_PORT, MUXER_VIDEO_PORT,
    MuxerComponent, VIDEO_ENCODER_INPUT_PORT, VIDEO_ENCODER_OUTPUT_PORT, VideoEncoderComponent,
};
use mmpipe::config::ComponentConfig;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

struct Rig {
    venc: Arc<dyn Component>,
    muxer: Arc<dyn Component>,
    adec: Arc<dyn Component>,
}

fn rig() -> Rig {
    let venc = VideoEncoderComponent::create(
        encoder_factory(Arc::new(AtomicBool::new(false))),
        ComponentConfig::new("venc"),
    )
    .unwrap();
    let muxer = MuxerComponent::create(
        muxer_factory(Arc::new(MuxerLog::default())),
        ComponentConfig::new("muxer"),
    )
    .unwrap();
    let adec = AudioDecoderComponent::create(
        decoder_factory(Arc::new(DecoderLog::default())),
        ComponentConfig::new("adec"),
    )
    .unwrap();
    Rig { venc, muxer, adec }
}

fn assert_unbound(component: &Arc<dyn Component>, port: u32) {
    let info = component.bind_info(port).unwrap();
    assert!(!info.is_bound(), "{}:{port} is bound", component.name());
}

// ============================================================================
// Successful binding
// ============================================================================

/// Test that a tunnel records the peer on both sides.
#[test]
fn test_tunnel_binds_both_sides() {
    let Rig { venc, muxer, .. } = rig();

    tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_VIDEO_PORT).unwrap();

    let out = venc.bind_info(VIDEO_ENCODER_OUTPUT_PORT).unwrap();
    assert_eq!(out.peer_id(), Some(muxer.id()));
    assert_eq!(out.peer_port(), MUXER_VIDEO_PORT);
    let inp = muxer.bind_info(MUXER_VIDEO_PORT).unwrap();
    assert_eq!(inp.peer_id(), Some(venc.id()));
    assert_eq!(inp.peer_port(), VIDEO_ENCODER_OUTPUT_PORT);
    assert!(inp.is_peer_alive());

    untunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_VIDEO_PORT).unwrap();
    assert_unbound(&venc, VIDEO_ENCODER_OUTPUT_PORT);
    assert_unbound(&muxer, MUXER_VIDEO_PORT);
}

/// Test that an output port records a bind request without validation.
#[test]
fn test_output_side_records_peer() {
    let Rig { venc, muxer, .. } = rig();

    venc.bind_request(VIDEO_ENCODER_OUTPUT_PORT, Some(&muxer), MUXER_VIDEO_PORT)
        .unwrap();
    assert!(venc.bind_info(VIDEO_ENCODER_OUTPUT_PORT).unwrap().is_bound());

    venc.bind_request(VIDEO_ENCODER_OUTPUT_PORT, None, 0).unwrap();
    assert_unbound(&venc, VIDEO_ENCODER_OUTPUT_PORT);
}

// ============================================================================
// Refusals
// ============================================================================

/// Test that binding two inputs or two outputs fails and leaves both unbound.
#[test]
fn test_same_direction_not_compatible() {
    let Rig { venc, muxer, adec } = rig();

    let err = tunnel(&muxer, MUXER_AUDIO_PORT, &venc, VIDEO_ENCODER_INPUT_PORT).unwrap_err();
    assert!(matches!(err, Error::PortNotCompatible(_)));
    assert_unbound(&muxer, MUXER_AUDIO_PORT);
    assert_unbound(&venc, VIDEO_ENCODER_INPUT_PORT);

    let err = tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &adec, AUDIO_DECODER_OUTPUT_PORT)
        .unwrap_err();
    assert!(matches!(err, Error::PortNotCompatible(_)));
    assert_unbound(&venc, VIDEO_ENCODER_OUTPUT_PORT);
    assert_unbound(&adec, AUDIO_DECODER_OUTPUT_PORT);

    // Direct input-side request against an input peer port.
    let err = muxer
        .bind_request(MUXER_VIDEO_PORT, Some(&venc), VIDEO_ENCODER_INPUT_PORT)
        .unwrap_err();
    assert!(matches!(err, Error::PortNotCompatible(_)));
    assert_unbound(&muxer, MUXER_VIDEO_PORT);
}

/// Test that an input port refuses a peer output of another domain.
#[test]
fn test_domain_mismatch_not_compatible() {
    let Rig { venc, muxer, .. } = rig();

    let err = tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_AUDIO_PORT).unwrap_err();
    assert!(matches!(err, Error::PortNotCompatible(_)));
    assert_unbound(&venc, VIDEO_ENCODER_OUTPUT_PORT);
    assert_unbound(&muxer, MUXER_AUDIO_PORT);
}

/// Test that binding outside LOADED fails with InvalidState and changes nothing.
#[test]
fn test_bind_requires_loaded() {
    let Rig { venc, muxer, .. } = rig();
    let mut obs = Observer::attach(&[&*venc]);
    set_state(&mut obs, &*venc, ComponentState::Idle);

    let err = venc
        .bind_request(VIDEO_ENCODER_OUTPUT_PORT, Some(&muxer), MUXER_VIDEO_PORT)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { state: ComponentState::Idle }));
    assert_unbound(&venc, VIDEO_ENCODER_OUTPUT_PORT);

    let err = tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_VIDEO_PORT).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    assert_unbound(&muxer, MUXER_VIDEO_PORT);

    set_state(&mut obs, &*venc, ComponentState::Loaded);
}

/// Test that a bad port index is a bad parameter.
#[test]
fn test_unknown_port() {
    let Rig { venc, muxer, .. } = rig();
    assert!(matches!(
        venc.bind_request(7, Some(&muxer), MUXER_VIDEO_PORT),
        Err(Error::BadParameter(_))
    ));
    assert!(matches!(venc.bind_info(7), Err(Error::BadParameter(_))));
}

// ============================================================================
// Peer lifetime
// ============================================================================

/// Test that a dropped peer is reported as gone instead of kept alive.
#[test]
fn test_dropped_peer_is_gone() {
    let Rig { venc, muxer, .. } = rig();
    tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_VIDEO_PORT).unwrap();

    let muxer_id = muxer.id();
    drop(muxer);

    let info = venc.bind_info(VIDEO_ENCODER_OUTPUT_PORT).unwrap();
    assert!(info.is_bound());
    assert!(!info.is_peer_alive());
    assert!(matches!(info.peer(), Err(Error::PeerGone(id)) if id == muxer_id));
}
