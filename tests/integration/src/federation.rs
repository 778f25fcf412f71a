//! Integration tests for membership as reported over the controller port.

use fedmgr_federation::SUCCESS;

use crate::helpers::{find_free_port, write_definitions, ServerOptions, TestServer};

#[tokio::test]
async fn ping_answers_success() {
    let server = TestServer::start();
    let mut c = server.connect().await;
    assert_eq!(c.ping().await, SUCCESS);
    // the connection is persistent
    assert_eq!(c.ping().await, SUCCESS);
}

#[tokio::test]
async fn unfederated_by_default() {
    let server = TestServer::start();
    let mut c = server.connect().await;
    let info = c.federation_info().await;
    assert!(info.name.is_none());
    assert!(info.clusters.is_empty());
}

#[tokio::test]
async fn definitions_file_joins_federation() {
    let dir = tempfile::tempdir().unwrap();
    let port = find_free_port();
    let beta_port = find_free_port();
    let defs = write_definitions(
        dir.path(),
        &[("fed1", &[("alpha", port, 1), ("beta", beta_port, 2)])],
    );

    let server = TestServer::start_with(ServerOptions {
        port: Some(port),
        federations_file: Some(defs),
        ..Default::default()
    });
    let mut c = server.connect().await;
    let info = c.federation_info().await;
    assert_eq!(info.name.as_deref(), Some("fed1"));
    assert_eq!(info.cluster_names(), vec!["alpha", "beta"]);
    assert_eq!(info.clusters[1].control_port, beta_port);
    assert_eq!(info.clusters[0].fed.id, 1);
}

#[tokio::test]
async fn cluster_outside_every_federation_stays_inactive() {
    let dir = tempfile::tempdir().unwrap();
    let defs = write_definitions(
        dir.path(),
        &[(
            "fed1",
            &[("beta", find_free_port(), 2), ("gamma", find_free_port(), 3)],
        )],
    );

    let server = TestServer::start_with(ServerOptions {
        federations_file: Some(defs),
        ..Default::default()
    });
    let mut c = server.connect().await;
    assert!(c.federation_info().await.name.is_none());
}

#[tokio::test]
async fn siblings_see_the_same_federation() {
    let dir = tempfile::tempdir().unwrap();
    let alpha_port = find_free_port();
    let beta_port = find_free_port();
    let defs = write_definitions(
        dir.path(),
        &[("fed1", &[("alpha", alpha_port, 1), ("beta", beta_port, 2)])],
    );

    let alpha = TestServer::start_with(ServerOptions {
        port: Some(alpha_port),
        federations_file: Some(defs.clone()),
        ..Default::default()
    });
    let beta = TestServer::start_with(ServerOptions {
        cluster_name: "beta".into(),
        port: Some(beta_port),
        federations_file: Some(defs),
        ..Default::default()
    });

    let alpha_info = alpha.connect().await.federation_info().await;
    let beta_info = beta.connect().await.federation_info().await;
    assert_eq!(alpha_info.name, beta_info.name);
    // each controller lists itself first
    assert_eq!(alpha_info.cluster_names(), vec!["alpha", "beta"]);
    assert_eq!(beta_info.cluster_names(), vec!["beta", "alpha"]);
}

#[tokio::test]
async fn authenticated_controller_rejects_unsigned_frames() {
    let server = TestServer::start_with(ServerOptions {
        auth_pass: Some("fed-secret".into()),
        ..Default::default()
    });

    let mut good = server.connect_with_secret("fed-secret").await;
    assert_eq!(good.ping().await, SUCCESS);

    let mut unsigned = server.connect().await;
    assert!(!unsigned.try_ping().await);

    let mut wrong = server.connect_with_secret("other").await;
    assert!(!wrong.try_ping().await);
}
