//! Integration tests for the component state machine and control surface.
//!
//! These tests drive real components (video encoder with a mock codec) through
//! their lifecycle and check the events and errors each command produces.

mod common;

use common::*;
use mmpipe::buffer::MediaBuffer;
use mmpipe::component::{
    Command, Component, ComponentEvent, ComponentState, Config, ConfigIndex, Param, ParamIndex,
};
use mmpipe::components::{
    VIDEO_ENCODER_INPUT_PORT, VIDEO_ENCODER_OUTPUT_PORT, VideoEncoderComponent,
};
use mmpipe::config::ComponentConfig;
use mmpipe::{Error, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ComponentState::*;

fn encoder() -> Arc<VideoEncoderComponent> {
    VideoEncoderComponent::create(
        encoder_factory(Arc::new(AtomicBool::new(false))),
        ComponentConfig::new("venc-test"),
    )
    .expect("create encoder")
}

// ============================================================================
// Transitions
// ============================================================================

/// Test that every legal transition completes with a CommandComplete event.
#[test]
fn test_full_lifecycle() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    assert_eq!(venc.get_state(), Loaded);
    walk(&mut obs, &[&*venc], &[Idle, Executing, Pause, Executing, Pause, Idle, Loaded]);
    assert_eq!(venc.get_state(), Loaded);

    let errors = obs
        .events(venc.id())
        .into_iter()
        .filter(|e| matches!(e, ComponentEvent::Error { .. }))
        .count();
    assert_eq!(errors, 0);
    venc.deinit().unwrap();
}

/// Test that requesting the current state yields exactly one SameState error.
#[test]
fn test_same_state_rejected() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    venc.send_command(Command::SetState(Loaded), None).unwrap();
    let event = obs.wait_error(venc.id()).expect("error event");
    assert_eq!(
        event,
        ComponentEvent::Error {
            kind: ErrorKind::SameState,
            state: Loaded
        }
    );
    assert_eq!(venc.get_state(), Loaded);

    // The component keeps working afterwards.
    set_state(&mut obs, &*venc, Idle);
    obs.settle(Duration::from_millis(20));
    let errors: Vec<_> = obs
        .events(venc.id())
        .into_iter()
        .filter(|e| matches!(e, ComponentEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    set_state(&mut obs, &*venc, Loaded);
}

/// Test that transitions outside the table are refused and leave the state alone.
#[test]
fn test_incorrect_transition() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    venc.send_command(Command::SetState(Executing), None).unwrap();
    assert_eq!(
        obs.wait_error(venc.id()),
        Some(ComponentEvent::Error {
            kind: ErrorKind::IncorrectStateTransition,
            state: Loaded
        })
    );
    assert_eq!(venc.get_state(), Loaded);

    set_state(&mut obs, &*venc, Idle);
    venc.send_command(Command::SetState(Pause), None).unwrap();
    assert_eq!(
        obs.wait_error(venc.id()),
        Some(ComponentEvent::Error {
            kind: ErrorKind::IncorrectStateTransition,
            state: Idle
        })
    );
    assert_eq!(venc.get_state(), Idle);
    set_state(&mut obs, &*venc, Loaded);
}

/// Test that INVALID is terminal and announced with an error first.
#[test]
fn test_invalid_is_terminal() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    set_state(&mut obs, &*venc, Idle);
    set_state(&mut obs, &*venc, Invalid);

    let events = obs.events(venc.id());
    let tail = &events[events.len() - 2..];
    assert_eq!(
        tail,
        &[
            ComponentEvent::Error {
                kind: ErrorKind::InvalidState,
                state: Invalid
            },
            ComponentEvent::CommandComplete(Invalid),
        ]
    );

    venc.send_command(Command::SetState(Loaded), None).unwrap();
    assert_eq!(
        obs.wait_error(venc.id()),
        Some(ComponentEvent::Error {
            kind: ErrorKind::IncorrectStateTransition,
            state: Invalid
        })
    );
    assert!(venc.deinit().is_ok());
}

/// Test that control operations are refused once INVALID, while givebacks
/// from peers are still looked at.
#[test]
fn test_invalid_refuses_operations() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);
    set_state(&mut obs, &*venc, Invalid);

    let refused = |result: Result<(), Error>| {
        assert!(
            matches!(result, Err(Error::InvalidState { state: Invalid })),
            "{result:?}"
        );
    };
    refused(venc.set_parameter(Param::VideoQuality(50)));
    refused(venc.get_parameter(ParamIndex::VideoQuality).map(|_| ()));
    refused(venc.set_config(Config::TimePosition(secs(3))));
    refused(venc.get_config(ConfigIndex::TimePosition).map(|_| ()));
    refused(venc.bind_request(VIDEO_ENCODER_OUTPUT_PORT, None, 0));
    refused(venc.send_buffer(&MediaBuffer::frame(
        0,
        VIDEO_ENCODER_INPUT_PORT,
        video_frame(secs(0)),
    )));
    assert_eq!(venc.handler().quality(), 90);

    // A giveback reaches the handler, which rejects the missing token.
    let stray = MediaBuffer::packet(VIDEO_ENCODER_OUTPUT_PORT, 0, video_packet(secs(0)));
    assert!(matches!(venc.giveback_buffer(&stray), Err(Error::BadParameter(_))));

    venc.deinit().unwrap();
}

/// Test that a failing capability factory keeps the component in LOADED.
#[test]
fn test_factory_failure_keeps_loaded() {
    let venc = VideoEncoderComponent::create(broken_encoder_factory(), ComponentConfig::default())
        .unwrap();
    let mut obs = Observer::attach(&[&*venc]);

    venc.send_command(Command::SetState(Idle), None).unwrap();
    assert_eq!(
        obs.wait_error(venc.id()),
        Some(ComponentEvent::Error {
            kind: ErrorKind::InsufficientResources,
            state: Loaded
        })
    );
    assert_eq!(venc.get_state(), Loaded);
}

// ============================================================================
// Deinit
// ============================================================================

/// Test that deinit is only legal in LOADED or INVALID and only once.
#[test]
fn test_deinit_rules() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    set_state(&mut obs, &*venc, Idle);
    assert!(matches!(venc.deinit(), Err(Error::InvalidState { state: Idle })));

    set_state(&mut obs, &*venc, Loaded);
    venc.deinit().unwrap();

    assert!(matches!(venc.deinit(), Err(Error::InvalidState { .. })));
    assert!(matches!(
        venc.send_command(Command::SetState(Idle), None),
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(venc.pending_messages(), 0);
}

/// Test that dropping a live component stops its worker.
#[test]
fn test_drop_stops_worker() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);
    set_state(&mut obs, &*venc, Idle);
    set_state(&mut obs, &*venc, Executing);

    drop(venc);
    obs.settle(Duration::from_millis(20));
}

// ============================================================================
// Buffers and parameters
// ============================================================================

/// Test that send_buffer outside EXECUTING is refused and queues nothing.
#[test]
fn test_send_buffer_in_pause() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);
    walk(&mut obs, &[&*venc], &[Idle, Executing, Pause]);

    let buffer = MediaBuffer::frame(0, VIDEO_ENCODER_INPUT_PORT, video_frame(secs(0)));
    let before = buffer.clone();
    assert!(matches!(
        venc.send_buffer(&buffer),
        Err(Error::InvalidState { state: Pause })
    ));
    assert_eq!(buffer, before);

    let counts = venc.handler().frame_counts();
    assert_eq!(counts.ready, 0);
    assert_eq!(counts.processing, 0);
    assert!(counts.is_conserved());

    walk(&mut obs, &[&*venc], &[Idle, Loaded]);
}

/// Test that send_buffer on an output port is a bad parameter.
#[test]
fn test_send_buffer_wrong_port() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);
    walk(&mut obs, &[&*venc], &[Idle, Executing]);

    let buffer = MediaBuffer::frame(0, 1, video_frame(secs(0)));
    assert!(matches!(venc.send_buffer(&buffer), Err(Error::BadParameter(_))));

    walk(&mut obs, &[&*venc], &[Idle, Loaded]);
}

/// Test encoder quality validation.
#[test]
fn test_quality_parameter() {
    let venc = encoder();

    assert_eq!(
        venc.get_parameter(ParamIndex::VideoQuality).unwrap(),
        Param::VideoQuality(90)
    );
    venc.set_parameter(Param::VideoQuality(40)).unwrap();
    assert_eq!(venc.handler().quality(), 40);

    assert!(matches!(
        venc.set_parameter(Param::VideoQuality(0)),
        Err(Error::BadParameter(_))
    ));
    assert!(matches!(
        venc.set_parameter(Param::VideoQuality(101)),
        Err(Error::BadParameter(_))
    ));
    assert!(matches!(
        venc.get_parameter(ParamIndex::ContentUri),
        Err(Error::Unsupported(_))
    ));
}

/// Test that port formats can only change in LOADED and keep their direction.
#[test]
fn test_port_definition_rules() {
    let venc = encoder();
    let mut obs = Observer::attach(&[&*venc]);

    let mut def = venc.port_definition(VIDEO_ENCODER_INPUT_PORT).unwrap();
    def.format = mmpipe::format::PortFormat::Video(mmpipe::format::VideoFormat::new(
        mmpipe::format::VideoCoding::Raw,
        1280,
        720,
    ));
    venc.set_parameter(Param::PortDefinition(def)).unwrap();
    assert_eq!(
        venc.get_parameter(ParamIndex::PortDefinition(VIDEO_ENCODER_INPUT_PORT)).unwrap(),
        Param::PortDefinition(def)
    );

    let mut flipped = def;
    flipped.direction = mmpipe::component::PortDirection::Output;
    assert!(matches!(
        venc.set_parameter(Param::PortDefinition(flipped)),
        Err(Error::BadParameter(_))
    ));

    set_state(&mut obs, &*venc, Idle);
    assert!(matches!(
        venc.set_parameter(Param::PortDefinition(def)),
        Err(Error::InvalidState { state: Idle })
    ));
    set_state(&mut obs, &*venc, Loaded);
}
