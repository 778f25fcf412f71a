//! Integration tests for saving membership at shutdown and recovering it.

#![cfg(unix)]

use crate::helpers::{find_free_port, write_definitions, ServerOptions, TestServer};

#[tokio::test]
async fn membership_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let port = find_free_port();
    let beta_port = find_free_port();
    let defs = write_definitions(
        dir.path(),
        &[("fed1", &[("alpha", port, 1), ("beta", beta_port, 2)])],
    );

    // join from the definitions file, then shut down gracefully
    {
        let server = TestServer::start_with(ServerOptions {
            port: Some(port),
            state_dir: Some(state_dir.clone()),
            federations_file: Some(defs),
            ..Default::default()
        });
        let info = server.connect().await.federation_info().await;
        assert_eq!(info.name.as_deref(), Some("fed1"));
        server.stop();
    }
    assert!(state_dir.join("fed_mgr_state").exists());

    // restart without definitions: membership comes from the state file
    let server = TestServer::start_with(ServerOptions {
        port: Some(port),
        state_dir: Some(state_dir),
        ..Default::default()
    });
    let info = server.connect().await.federation_info().await;
    assert_eq!(info.name.as_deref(), Some("fed1"));
    assert_eq!(info.cluster_names(), vec!["alpha", "beta"]);
    assert_eq!(info.clusters[1].control_port, beta_port);
}

#[tokio::test]
async fn state_of_another_cluster_is_not_adopted() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let defs = write_definitions(
        dir.path(),
        &[(
            "fed1",
            &[("alpha", find_free_port(), 1), ("beta", find_free_port(), 2)],
        )],
    );

    {
        let server = TestServer::start_with(ServerOptions {
            state_dir: Some(state_dir.clone()),
            federations_file: Some(defs),
            ..Default::default()
        });
        server.stop();
    }

    // same state dir, different cluster name
    let server = TestServer::start_with(ServerOptions {
        cluster_name: "gamma".into(),
        state_dir: Some(state_dir),
        ..Default::default()
    });
    let info = server.connect().await.federation_info().await;
    assert!(info.name.is_none());
}

#[tokio::test]
async fn leaving_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let port = find_free_port();

    let joined = write_definitions(
        dir.path(),
        &[("fed1", &[("alpha", port, 1), ("beta", find_free_port(), 2)])],
    );
    {
        let server = TestServer::start_with(ServerOptions {
            port: Some(port),
            state_dir: Some(state_dir.clone()),
            federations_file: Some(joined),
            ..Default::default()
        });
        server.stop();
    }

    // alpha has been removed from the federation
    let removed = write_definitions(
        dir.path(),
        &[("fed1", &[("beta", find_free_port(), 2)])],
    );
    {
        let server = TestServer::start_with(ServerOptions {
            port: Some(port),
            state_dir: Some(state_dir.clone()),
            federations_file: Some(removed),
            ..Default::default()
        });
        assert!(server.connect().await.federation_info().await.name.is_none());
        server.stop();
    }

    let server = TestServer::start_with(ServerOptions {
        port: Some(port),
        state_dir: Some(state_dir),
        ..Default::default()
    });
    assert!(server.connect().await.federation_info().await.name.is_none());
}
