//! Full links over in-memory duplex streams.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::*;
use service_link::core::header::Header;
use service_link::error::LinkError;
use service_link::link::{LinkContext, LinkState, ServiceLink};
use service_link::service::ServiceDirectory;
use service_link::transport::StreamChannel;
use std::sync::Arc;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

fn spawn_link(
    directory: &Arc<ServiceDirectory>,
) -> (DuplexStream, JoinHandle<(LinkState, Result<(), LinkError>)>) {
    let (server_io, client) = duplex(4096);
    let ctx = Arc::new(LinkContext::new(directory.clone(), "/adder_node"));
    let task = tokio::spawn(async move {
        let mut link = ServiceLink::new(StreamChannel::new(server_io, "client"), ctx);
        let result = link.run().await;
        (link.state(), result)
    });
    (client, task)
}

fn directory() -> Arc<ServiceDirectory> {
    let directory = Arc::new(ServiceDirectory::new());
    directory.advertise(add_two_ints()).unwrap();
    directory
}

#[tokio::test]
async fn test_negotiate_then_call() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);

    send_header(&mut client, &request_header("*")).await;
    let reply = recv_header(&mut client).await;
    assert_eq!(reply.get("md5sum"), Some(ADD_TWO_INTS_MD5));
    assert_eq!(reply.get("callerid"), Some("/adder_node"));
    assert_eq!(reply.get("type"), Some("AddTwoIntsRequest"));

    assert_eq!(call_add(&mut client, 3, 4).await, [1, 4, 0, 0, 0, 7, 0, 0, 0]);
    assert_eq!(call_add(&mut client, -10, 4).await[5..], (-6i32).to_le_bytes());
    assert_eq!(directory.get("add_two_ints").unwrap().link_count(), 1);

    drop(client);
    let (state, result) = task.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(state, LinkState::Closed);
    assert_eq!(directory.get("add_two_ints").unwrap().link_count(), 0);
}

#[tokio::test]
async fn test_failed_request_keeps_link_open() {
    let directory = directory();
    let (mut client, _task) = spawn_link(&directory);
    send_header(&mut client, &request_header(ADD_TWO_INTS_MD5)).await;
    recv_header(&mut client).await;

    client.write_all(&[2, 0, 0, 0, 9, 9]).await.unwrap();
    let mut failure = [0xffu8; 5];
    tokio::io::AsyncReadExt::read_exact(&mut client, &mut failure)
        .await
        .unwrap();
    assert_eq!(failure, [0, 0, 0, 0, 0]);

    assert_eq!(call_add(&mut client, 1, 1).await[0], 1);
}

#[tokio::test]
async fn test_checksum_mismatch_reported_then_closed() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);

    send_header(&mut client, &request_header("0000")).await;
    let reply = recv_header(&mut client).await;
    assert_eq!(
        reply.get("error"),
        Some(
            format!(
                "client wants service add_two_ints to have md5sum 0000, but it has {ADD_TWO_INTS_MD5}. Dropping connection."
            )
            .as_str()
        )
    );
    assert!(read_to_close(&mut client).await.is_empty());

    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(LinkError::ChecksumMismatch { .. })));
    assert_eq!(directory.get("add_two_ints").unwrap().link_count(), 0);
}

#[tokio::test]
async fn test_missing_callerid_reported() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);

    let header = Header::new()
        .with("md5sum", "*")
        .with("service", "add_two_ints");
    send_header(&mut client, &header).await;

    let reply = recv_header(&mut client).await;
    assert_eq!(
        reply.get("error"),
        Some("bogus tcpros header. did not have the required elements: md5sum, service, callerid")
    );
    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(LinkError::MalformedHeader(_))));
}

#[tokio::test]
async fn test_unknown_service_reported() {
    let directory = Arc::new(ServiceDirectory::new());
    let (mut client, task) = spawn_link(&directory);

    send_header(&mut client, &request_header("*")).await;
    let reply = recv_header(&mut client).await;
    assert_eq!(
        reply.get("error"),
        Some("received a tcpros connection for a nonexistent service [add_two_ints].")
    );
    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(LinkError::ServiceNotFound(_))));
}

#[tokio::test]
async fn test_oversized_frame_drops_connection_silently() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);
    send_header(&mut client, &request_header("*")).await;
    recv_header(&mut client).await;

    client
        .write_all(&1_000_000_001u32.to_le_bytes())
        .await
        .unwrap();
    assert!(read_to_close(&mut client).await.is_empty());

    let (state, result) = task.await.unwrap();
    assert!(matches!(result, Err(LinkError::FrameTooLarge(1_000_000_001))));
    assert_eq!(state, LinkState::Closed);
    assert_eq!(directory.get("add_two_ints").unwrap().link_count(), 0);
}

#[tokio::test]
async fn test_withdraw_disconnects_peer() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);
    send_header(&mut client, &request_header("*")).await;
    recv_header(&mut client).await;

    let service = directory.get("add_two_ints").unwrap();
    assert_eq!(service.links()[0].callerid(), "/client");
    drop(service);

    assert!(directory.withdraw("add_two_ints"));
    assert!(read_to_close(&mut client).await.is_empty());
    let (state, result) = task.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(state, LinkState::Closed);
}

#[tokio::test]
async fn test_probe_gets_header_and_close() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);

    send_header(&mut client, &request_header("*").with("probe", "1")).await;
    let reply = recv_header(&mut client).await;
    assert_eq!(reply.get("response_type"), Some("AddTwoIntsResponse"));
    assert!(read_to_close(&mut client).await.is_empty());

    let (_, result) = task.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(directory.get("add_two_ints").unwrap().link_count(), 0);
}

#[tokio::test]
async fn test_links_are_independent() {
    let directory = directory();
    let (mut first, _first_task) = spawn_link(&directory);
    let (mut second, second_task) = spawn_link(&directory);

    send_header(&mut first, &request_header("*")).await;
    recv_header(&mut first).await;
    send_header(&mut second, &request_header("bad")).await;
    recv_header(&mut second).await;
    assert!(second_task.await.unwrap().1.is_err());

    assert_eq!(call_add(&mut first, 20, 22).await[5..], 42i32.to_le_bytes());
}

#[tokio::test]
async fn test_aborted_link_task_leaves_service() {
    let directory = directory();
    let (mut client, task) = spawn_link(&directory);

    send_header(&mut client, &request_header("*")).await;
    recv_header(&mut client).await;
    assert_eq!(call_add(&mut client, 1, 2).await, [1, 4, 0, 0, 0, 3, 0, 0, 0]);
    let service = directory.get("add_two_ints").unwrap();
    assert_eq!(service.link_count(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(service.link_count(), 0);
}
