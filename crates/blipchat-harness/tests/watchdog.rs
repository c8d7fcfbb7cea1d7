//! Maintenance watchdog under paused tokio time

use std::time::Duration;

use blipchat_core::radio::codes;
use blipchat_core::{BlipResult, SessionConfig, SessionEvent};
use blipchat_harness::{NodeProfile, TestNode, VirtualAir};

fn watchdog_config() -> SessionConfig {
    SessionConfig::default()
        .with_connection_timeout(Duration::from_secs(10))
        .with_maintenance_interval(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_stuck_connection_is_reaped_and_retried() -> BlipResult<()> {
    let air = VirtualAir::new();
    let target = TestNode::new(
        &air,
        "target",
        NodeProfile::conformant().with_scan_rejected(codes::INTERNAL_ERROR),
    )
    .await;
    let mut stuck = TestNode::with_config(&air, "stuck", NodeProfile::stalling(), watchdog_config()).await;

    target.start().await?;
    stuck.start().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(air.stats().connects(), 1);
    stuck.drain_events();

    // Connecting -> Disconnecting after the timeout, then Closed after another
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(stuck
        .drain_events()
        .contains(&SessionEvent::PeerSetChanged(Vec::new())));

    // The address is free again: the next advertisement starts a new attempt
    air.rebroadcast().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(air.stats().connects(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_ready_peers_survive_maintenance() -> BlipResult<()> {
    let air = VirtualAir::new();
    let a = TestNode::with_config(&air, "a", NodeProfile::conformant(), watchdog_config()).await;
    let b = TestNode::with_config(&air, "b", NodeProfile::conformant(), watchdog_config()).await;
    a.start().await?;
    b.start().await?;
    a.wait_for_peer(&b.address).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(a.session.ready_peers(), vec![b.address.clone()]);
    assert_eq!(b.session.ready_peers(), vec![a.address.clone()]);
    Ok(())
}
