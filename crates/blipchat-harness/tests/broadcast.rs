//! Broadcast fan-out across several virtual nodes

use std::time::Duration;

use blipchat_core::radio::codes;
use blipchat_core::{BlipResult, FanoutReport, SendError, SessionConfig};
use blipchat_harness::{NodeProfile, TestNode, VirtualAir};
use tokio_test::assert_ok;

/// Node that only accepts inbound peers, so every delivery it makes is a notification
fn listener_only() -> NodeProfile {
    NodeProfile::conformant().with_scan_rejected(codes::INTERNAL_ERROR)
}

#[tokio::test]
async fn test_send_without_peers_succeeds_empty() -> BlipResult<()> {
    let air = VirtualAir::new();
    let node = TestNode::new(&air, "alone", NodeProfile::conformant()).await;
    node.start().await?;

    let report = node.session.send(b"anyone?".to_vec()).await?;
    assert_eq!(report, FanoutReport { attempted: 0, failed: 0 });
    assert_eq!(air.stats().writes() + air.stats().notifications(), 0);
    Ok(())
}

#[tokio::test]
async fn test_payload_arrives_byte_identical() -> BlipResult<()> {
    let air = VirtualAir::new();
    let a = TestNode::new(&air, "a", NodeProfile::conformant()).await;
    let mut b = TestNode::new(&air, "b", NodeProfile::conformant()).await;
    a.start().await?;
    b.start().await?;
    a.wait_for_peer(&b.address).await;

    let payload: Vec<u8> = (0..=255u8).chain(0..=255u8).collect();
    assert_eq!(payload.len(), 512);
    assert_ok!(a.session.send(payload.clone()).await);
    assert_eq!(b.next_message().await, payload);
    Ok(())
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() -> BlipResult<()> {
    let air = VirtualAir::new();
    let config = SessionConfig::default().with_max_payload_size(16);
    let node = TestNode::with_config(&air, "a", NodeProfile::conformant(), config).await;
    node.start().await?;

    let result = node.session.send(vec![0u8; 17]).await;
    assert_eq!(
        result,
        Err(SendError::PayloadTooLarge {
            size: 17,
            max_size: 16
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_fanout_reaches_every_ready_peer() -> BlipResult<()> {
    let air = VirtualAir::new();
    let hub = TestNode::new(&air, "hub", listener_only()).await;
    let mut spokes = Vec::new();
    for name in ["s1", "s2", "s3"] {
        spokes.push(TestNode::new(&air, name, NodeProfile::conformant()).await);
    }

    hub.start().await?;
    for spoke in &spokes {
        spoke.start().await?;
    }
    hub.wait_for_peers(|ready| ready.len() == 3).await;

    let report = hub.session.send(br#"{"text":"all"}"#.to_vec()).await?;
    assert_eq!(report, FanoutReport { attempted: 3, failed: 0 });
    for spoke in &mut spokes {
        assert_eq!(spoke.next_message().await, br#"{"text":"all"}"#.to_vec());
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_does_not_block_others() -> BlipResult<()> {
    let air = VirtualAir::new();
    let hub = TestNode::new(&air, "hub", listener_only()).await;
    let broken = TestNode::new(&air, "broken", NodeProfile::conformant()).await;
    let mut healthy = TestNode::new(&air, "healthy", NodeProfile::conformant()).await;

    hub.start().await?;
    broken.start().await?;
    healthy.start().await?;
    hub.wait_for_peers(|ready| ready.len() == 2).await;
    air.fail_notifications(&hub.address, &broken.address).await;

    let report = hub.session.send(b"ping".to_vec()).await?;
    assert_eq!(report, FanoutReport { attempted: 2, failed: 1 });
    assert_eq!(report.delivered(), 1);
    assert_eq!(healthy.next_message().await, b"ping".to_vec());

    // The failing peer stays Ready; failures are per message, not per link
    assert_eq!(hub.session.ready_peers().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_notified_value_is_served_to_reads() -> BlipResult<()> {
    let air = VirtualAir::new();
    let hub = TestNode::new(&air, "hub", listener_only()).await;
    let spoke = TestNode::new(&air, "spoke", NodeProfile::conformant()).await;
    hub.start().await?;
    spoke.start().await?;
    hub.wait_for_peer(&spoke.address).await;

    hub.session.send(b"latest".to_vec()).await?;
    assert_eq!(
        air.characteristic_value(&hub.address).await,
        Some(b"latest".to_vec())
    );
    Ok(())
}

#[tokio::test]
async fn test_disconnected_peer_is_not_targeted() -> BlipResult<()> {
    let air = VirtualAir::new();
    let hub = TestNode::new(&air, "hub", listener_only()).await;
    let leaving = TestNode::new(&air, "leaving", NodeProfile::conformant()).await;
    let staying = TestNode::new(&air, "staying", NodeProfile::conformant()).await;
    hub.start().await?;
    leaving.start().await?;
    staying.start().await?;
    hub.wait_for_peers(|ready| ready.len() == 2).await;

    leaving.session.stop().await;
    hub.wait_for_peers(|ready| ready == &vec![staying.address.clone()]).await;

    let report = hub.session.send(b"still here?".to_vec()).await?;
    assert_eq!(report, FanoutReport { attempted: 1, failed: 0 });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(air.stats().failed_deliveries(), 0);
    Ok(())
}
