//! Release discipline: whatever was acquired is released exactly once,
//! newest first, on every exit path.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use common::Fixture;
use platform::mocks::{Edge, Fault, HostEvent, Resource};
use platform::{BindStrategy, DeviceNode, Errno};
use rmem_transfer::{
    AcquireError, BufferRole, ChannelPolicy, ProbeError, ProbeOptions, OF_MATCH_TABLE,
};

fn acquired(events: &[HostEvent]) -> Vec<Resource> {
    events
        .iter()
        .filter_map(HostEvent::resource)
        .filter(|(_, edge)| *edge == Edge::Acquire)
        .map(|(res, _)| res)
        .collect()
}

fn released(events: &[HostEvent]) -> Vec<Resource> {
    events
        .iter()
        .filter_map(HostEvent::resource)
        .filter(|(_, edge)| *edge == Edge::Release)
        .map(|(res, _)| res)
        .collect()
}

/// Every acquisition failure point, with the error it must produce and how
/// many resources were held when it happened.
#[test]
fn each_acquisition_failure_unwinds_what_was_acquired() {
    let cases: [(Fixture, AcquireError, usize); 6] = [
        (
            Fixture::default().fault(Fault::NoChannel),
            AcquireError::ChannelUnavailable,
            0,
        ),
        (
            Fixture::default().fault(Fault::BindFails(Errno::EBUSY)),
            AcquireError::RegionBindFailed {
                index: 0,
                errno: Errno::EBUSY,
            },
            1,
        ),
        (
            Fixture {
                fixed_size: 0x1000,
                ..Fixture::default()
            },
            AcquireError::RegionTooSmall {
                index: 1,
                size: 0x1000,
                required: 16384,
            },
            2,
        ),
        (
            Fixture::default().fault(Fault::AllocFails { nth: 0 }),
            AcquireError::OutOfMemory {
                buffer: BufferRole::Src,
            },
            2,
        ),
        (
            Fixture::default().fault(Fault::AllocFails { nth: 1 }),
            AcquireError::OutOfMemory {
                buffer: BufferRole::Dst,
            },
            3,
        ),
        (
            Fixture::default().fault(Fault::MapFails),
            AcquireError::MapFailed,
            4,
        ),
    ];

    for (fixture, expected, held) in cases {
        let out = fixture.probe();
        assert_eq!(out.result.unwrap_err(), ProbeError::Acquire(expected));

        let events = out.host.events();
        let mut got = acquired(&events);
        assert_eq!(got.len(), held, "{expected:?}");
        got.reverse();
        assert_eq!(released(&events), got, "{expected:?}");
        out.host.check_lifo().unwrap();
        assert!(out.host.live_resources().is_empty());
    }
}

#[test]
fn missing_region_references() {
    const NO_REGIONS: DeviceNode = DeviceNode::new("t", OF_MATCH_TABLE, &[]);
    const ONE_REGION: DeviceNode = DeviceNode::new("t", OF_MATCH_TABLE, &["rmem_reserved"]);
    const UNKNOWN_FIXED: DeviceNode =
        DeviceNode::new("t", OF_MATCH_TABLE, &["rmem_reserved", "rmem_nowhere"]);

    for (node, expected) in [
        (NO_REGIONS, AcquireError::RegionMissing { index: 0 }),
        (ONE_REGION, AcquireError::RegionMissing { index: 1 }),
        (UNKNOWN_FIXED, AcquireError::RegionLookupFailed { index: 1 }),
    ] {
        let out = Fixture {
            node,
            ..Fixture::default()
        }
        .probe();
        assert_eq!(out.result.unwrap_err(), ProbeError::Acquire(expected));
        out.host.check_lifo().unwrap();
        assert!(out.host.live_resources().is_empty());
    }
}

#[test]
fn full_run_releases_in_reverse_acquisition_order() {
    let out = Fixture::default().probe();
    out.result.as_ref().unwrap();

    let events = out.host.events();
    let mut order = acquired(&events);
    assert_eq!(order.len(), 5);
    assert!(matches!(order[0], Resource::Channel(_)));
    assert!(matches!(order[4], Resource::Mapping(_)));
    order.reverse();
    assert_eq!(released(&events), order);

    // Nothing is released until every copy step is done.
    let first_release = events
        .iter()
        .position(|e| matches!(e.resource(), Some((_, Edge::Release))))
        .unwrap();
    let last_copy = events
        .iter()
        .rposition(|e| matches!(e, HostEvent::Terminated(_)))
        .unwrap();
    assert!(last_copy < first_release);
}

#[test]
fn transfer_failures_still_release_everything() {
    for fault in [
        Fault::PrepareFails { nth: 0 },
        Fault::SubmitFails { nth: 0 },
        Fault::TransferErrors { nth: 1 },
        Fault::TransferTimesOut { nth: 0 },
    ] {
        let out = Fixture::default().fault(fault).probe();
        assert!(out.result.is_ok(), "{fault:?}");
        out.host.check_lifo().unwrap();
        assert_eq!(acquired(&out.host.events()).len(), 5);
    }
}

#[test]
fn child_device_strategy_unwinds_child_last() {
    let options = ProbeOptions {
        bind_strategy: BindStrategy::ChildDevice,
        ..ProbeOptions::default()
    };

    let out = Fixture {
        options,
        ..Fixture::default()
    }
    .probe();
    assert!(out.result.as_ref().unwrap().all_ok());
    out.host.check_lifo().unwrap();
    assert_eq!(out.count(|e| matches!(e, HostEvent::ChildCreated(_))), 1);

    // Binding failure after the child exists: the child is destroyed.
    let out = Fixture {
        options,
        ..Fixture::default()
    }
    .fault(Fault::BindFails(Errno::EINVAL))
    .probe();
    assert_eq!(
        *out.result.as_ref().unwrap_err(),
        ProbeError::Acquire(AcquireError::RegionBindFailed {
            index: 0,
            errno: Errno::EINVAL
        })
    );
    assert_eq!(out.count(|e| matches!(e, HostEvent::ChildDestroyed(_))), 1);
    out.host.check_lifo().unwrap();
}

#[test]
fn attach_status_follows_channel_policy() {
    for (policy, errno) in [
        (ChannelPolicy::Defer, Errno::EPROBE_DEFER),
        (ChannelPolicy::Fail, Errno::ENODEV),
    ] {
        let fixture = Fixture {
            options: ProbeOptions {
                channel_policy: policy,
                ..ProbeOptions::default()
            },
            ..Fixture::default()
        }
        .fault(Fault::NoChannel);
        let out = fixture.probe();
        let status = rmem_transfer::probe_status(&out.result, policy);
        assert_eq!(status, errno.to_status());
        assert!(out.host.events().is_empty());
    }
}
