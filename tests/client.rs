use std::sync::Arc;

use viera::e2e_common::{Fault, MockTv, TEST_APP_ID, TEST_ENCRYPTION_KEY};
use viera::{ClientConfig, Credentials, RemoteKey, VieraClient, VieraError};

async fn plain_client(tv: &Arc<MockTv>) -> VieraClient<Arc<MockTv>> {
    VieraClient::connect_with_transport("192.168.0.10", None, ClientConfig::default(), tv.clone())
        .await
        .unwrap()
}

async fn encrypted_client(tv: &Arc<MockTv>) -> VieraClient<Arc<MockTv>> {
    VieraClient::connect_with_transport(
        "192.168.0.10",
        Some(Credentials::new(TEST_APP_ID, TEST_ENCRYPTION_KEY)),
        ClientConfig::default(),
        tv.clone(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn volume_round_trip() {
    let tv = Arc::new(MockTv::plain());
    let client = plain_client(&tv).await;

    client.set_volume(42).await.unwrap();
    assert_eq!(client.get_volume().await.unwrap(), 42);

    let request = tv.requests().pop().unwrap();
    assert_eq!(request.path, "/dmr/control_0");
    assert!(request
        .header("SOAPAction")
        .unwrap()
        .contains("RenderingControl:1#GetVolume"));
}

#[tokio::test]
async fn volume_out_of_range_is_not_sent() {
    let tv = Arc::new(MockTv::plain());
    let client = plain_client(&tv).await;
    assert!(matches!(
        client.set_volume(101).await,
        Err(VieraError::InvalidArgument(_))
    ));
    assert!(tv.requests().is_empty());
}

#[tokio::test]
async fn mute_round_trip() {
    let tv = Arc::new(MockTv::plain());
    let client = plain_client(&tv).await;

    assert!(!client.get_mute().await.unwrap());
    client.set_mute(true).await.unwrap();
    assert!(tv.muted());
    assert!(client.get_mute().await.unwrap());
}

#[tokio::test]
async fn missing_field_is_reported() {
    let tv = Arc::new(MockTv::plain());
    let client = plain_client(&tv).await;

    tv.push_fault(Fault::Reply("<s:Envelope><s:Body/></s:Envelope>".into()));
    match client.get_volume().await {
        Err(VieraError::MissingField(field)) => assert_eq!(field, "CurrentVolume"),
        other => panic!("unexpected result: {:?}", other),
    }

    tv.push_fault(Fault::Reply("<CurrentMute>2</CurrentMute>".into()));
    assert!(matches!(
        client.get_mute().await,
        Err(VieraError::MissingField(_))
    ));
}

#[tokio::test]
async fn keys_and_inputs() {
    let tv = Arc::new(MockTv::plain());
    let client = plain_client(&tv).await;

    client.send_key(RemoteKey::VolumeUp).await.unwrap();
    client.send_key_code("nrc_mute-onoff").await.unwrap();
    client.send_hdmi(2).await.unwrap();
    assert!(matches!(
        client.send_hdmi(0).await,
        Err(VieraError::InvalidArgument(_))
    ));
    client.launch_app("0387878700000014").await.unwrap();

    let params: Vec<String> = tv.received().into_iter().map(|c| c.parameters).collect();
    assert_eq!(
        params,
        vec![
            "<X_KeyEvent>NRC_VOLUP-ONOFF</X_KeyEvent>".to_string(),
            "<X_KeyEvent>NRC_MUTE-ONOFF</X_KeyEvent>".to_string(),
            "<X_KeyEvent>NRC_HDMI1-ONOFF</X_KeyEvent>".to_string(),
            "<X_AppType>vc_app</X_AppType><X_LaunchKeyword>product_id=0387878700000014</X_LaunchKeyword>"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn encrypted_client_wraps_keys_but_not_pin_requests() {
    let tv = Arc::new(MockTv::encrypted());
    let client = encrypted_client(&tv).await;
    assert_eq!(client.dispatcher().sequence_number().await, Some(1));

    client.send_key(RemoteKey::Power).await.unwrap();
    assert_eq!(client.dispatcher().sequence_number().await, Some(2));

    let reply = client.request_pin_code("Living <Room>").await.unwrap();
    assert!(reply.contains("<X_ChallengeKey>"));
    assert_eq!(client.dispatcher().sequence_number().await, Some(2));

    let received = tv.received();
    assert_eq!(received[0].action, "X_SendKey");
    assert_eq!(received[0].sequence, Some(2));
    assert_eq!(received[1].action, "X_DisplayPinCode");
    assert_eq!(received[1].sequence, None);
    assert_eq!(
        received[1].parameters,
        "<X_DeviceName>Living &lt;Room&gt;</X_DeviceName>"
    );
}

#[tokio::test]
async fn encrypted_client_reads_volume_in_clear() {
    let tv = Arc::new(MockTv::encrypted());
    tv.set_volume(8);
    let client = encrypted_client(&tv).await;
    assert_eq!(client.get_volume().await.unwrap(), 8);
    assert_eq!(client.dispatcher().sequence_number().await, Some(1));
}

#[tokio::test]
async fn connect_rejects_bad_input() {
    let tv = Arc::new(MockTv::plain());
    let err = VieraClient::connect_with_transport("999.1.1.1", None, ClientConfig::default(), tv.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, VieraError::InvalidAddress(_)));

    let err = VieraClient::connect_with_transport(
        "10.0.0.1",
        Some(Credentials::new(TEST_APP_ID, "dG9vIHNob3J0")),
        ClientConfig::default(),
        tv.clone(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VieraError::InvalidKeyFormat(_)));
    assert!(tv.requests().is_empty());
}

#[tokio::test]
async fn connect_fails_for_unpaired_application() {
    let tv = Arc::new(MockTv::paired("someone-else", TEST_ENCRYPTION_KEY));
    let err = VieraClient::connect_with_transport(
        "10.0.0.1",
        Some(Credentials::new(TEST_APP_ID, TEST_ENCRYPTION_KEY)),
        ClientConfig::default(),
        tv,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VieraError::HandshakeFailed(_)));
}

#[tokio::test]
async fn tv_answering_in_clear_still_works() {
    let tv = Arc::new(MockTv::encrypted().with_plain_results());
    let client = encrypted_client(&tv).await;
    let reply = client.send_key(RemoteKey::Home).await.unwrap();
    assert!(reply.contains("<u:X_SendKeyResponse"));
}
