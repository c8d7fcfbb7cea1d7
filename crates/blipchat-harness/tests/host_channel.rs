//! Host method channel driving a real session over the virtual air

use blipchat_core::{HostChannel, HostErrorCode, HostEvent, MethodCall, SessionState};
use blipchat_harness::{NodeProfile, TestNode, VirtualAir, TEST_CHARACTERISTIC, TEST_SERVICE};
use serde_json::{json, Value};

fn start_call() -> MethodCall {
    MethodCall::new(
        "startAdvertising",
        json!({
            "serviceUuid": TEST_SERVICE.to_string(),
            "characteristicUuid": TEST_CHARACTERISTIC.to_string(),
        }),
    )
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_the_radio() {
    let air = VirtualAir::new();
    let node = TestNode::new(&air, "a", NodeProfile::conformant()).await;
    let channel = HostChannel::new(node.session.clone());

    let missing = MethodCall::new("startAdvertising", json!({ "serviceUuid": TEST_SERVICE.to_string() }));
    let err = channel.handle(&missing).await.unwrap_err();
    assert_eq!(err.code, HostErrorCode::InvalidArguments);

    let malformed = MethodCall::new(
        "startAdvertising",
        json!({ "serviceUuid": "b1c0", "characteristicUuid": "b1c1" }),
    );
    let err = channel.handle(&malformed).await.unwrap_err();
    assert_eq!(err.code, HostErrorCode::InvalidUuid);

    assert_eq!(node.session.state(), SessionState::Idle);
    assert_eq!(air.stats().advertisements.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_start_send_stop_round_trip() {
    let air = VirtualAir::new();
    let a = TestNode::new(&air, "a", NodeProfile::conformant()).await;
    let mut b = TestNode::new(&air, "b", NodeProfile::conformant()).await;
    let host_a = HostChannel::new(a.session.clone());
    let host_b = HostChannel::new(b.session.clone());

    assert_eq!(host_a.handle(&start_call()).await.unwrap(), Value::Bool(true));
    assert_eq!(host_b.handle(&start_call()).await.unwrap(), Value::Bool(true));
    a.wait_for_peer(&b.address).await;

    let err = host_a.handle(&start_call()).await.unwrap_err();
    assert_eq!(err.code, HostErrorCode::AlreadyActive);

    let send = MethodCall::new("sendMessage", json!({ "text": "hello" }));
    assert_eq!(host_a.handle(&send).await.unwrap(), Value::Bool(true));

    let event = HostEvent::from_session(
        b.next_event(|e| matches!(e, blipchat_core::SessionEvent::MessageReceived(_)))
            .await,
    );
    assert_eq!(
        event,
        Some(HostEvent::MessageReceived(r#"{"text":"hello"}"#.to_string()))
    );

    let stop = MethodCall::new("stopAdvertising", Value::Null);
    assert_eq!(host_a.handle(&stop).await.unwrap(), Value::Bool(true));
    assert_eq!(a.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_session_errors_map_to_host_codes() {
    let air = VirtualAir::new();
    let node = TestNode::new(&air, "a", NodeProfile::powered_off()).await;
    let channel = HostChannel::new(node.session.clone());

    let err = channel.handle(&start_call()).await.unwrap_err();
    assert_eq!(err.code, HostErrorCode::BluetoothDisabled);

    let send = MethodCall::new("sendMessage", json!({ "text": "nobody" }));
    let err = channel.handle(&send).await.unwrap_err();
    assert_eq!(err.code, HostErrorCode::NotActive);

    let err = channel
        .handle(&MethodCall::new("sendMessage", json!([1, 2, 3])))
        .await
        .unwrap_err();
    assert_eq!(err.code, HostErrorCode::InvalidMessage);

    let err = channel
        .handle(&MethodCall::new("setTxPower", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err.code, HostErrorCode::NotImplemented);
}

#[tokio::test]
async fn test_device_name_defaults_when_absent() {
    let air = VirtualAir::new();
    let unnamed = TestNode::new(&air, "a", NodeProfile::conformant()).await;
    let named = TestNode::new(&air, "b", NodeProfile::conformant()).await;

    HostChannel::new(unnamed.session.clone())
        .handle(&start_call())
        .await
        .unwrap();
    assert_eq!(
        air.advertised_name(&unnamed.address).await.as_deref(),
        Some(blipchat_core::DEFAULT_LOCAL_NAME)
    );

    let mut call = start_call();
    call.arguments["deviceName"] = json!("Kitchen");
    HostChannel::new(named.session.clone())
        .handle(&call)
        .await
        .unwrap();
    assert_eq!(air.advertised_name(&named.address).await.as_deref(), Some("Kitchen"));
}
