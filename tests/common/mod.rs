//! Calling-side helpers shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use service_link::core::codec::HeaderCodec;
use service_link::core::header::Header;
use service_link::service::{Service, ServiceType};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

pub const ADD_TWO_INTS_MD5: &str = "6a2e34150c00229791cc89ff309fff21";

pub fn add_two_ints() -> Service {
    Service::from_fn(
        "add_two_ints",
        ServiceType::new(ADD_TWO_INTS_MD5, "AddTwoIntsRequest", "AddTwoIntsResponse"),
        |request| {
            if request.len() != 8 {
                return None;
            }
            let a = i32::from_le_bytes(request[0..4].try_into().ok()?);
            let b = i32::from_le_bytes(request[4..8].try_into().ok()?);
            Some(Bytes::copy_from_slice(&a.wrapping_add(b).to_le_bytes()))
        },
    )
}

pub fn request_header(md5sum: &str) -> Header {
    Header::new()
        .with("md5sum", md5sum)
        .with("service", "add_two_ints")
        .with("callerid", "/client")
}

pub async fn send_header<S: AsyncWrite + Unpin>(stream: &mut S, header: &Header) {
    let mut buf = BytesMut::new();
    HeaderCodec::default().encode(header, &mut buf).unwrap();
    stream.write_all(&buf).await.unwrap();
}

pub async fn recv_header<S: AsyncRead + Unpin>(stream: &mut S) -> Header {
    let len = stream.read_u32_le().await.unwrap() as usize;
    let mut block = vec![0u8; len];
    stream.read_exact(&mut block).await.unwrap();
    Header::decode(&block).unwrap()
}

pub async fn call_add<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, a: i32, b: i32) -> [u8; 9] {
    let mut request = Vec::with_capacity(12);
    request.extend_from_slice(&8u32.to_le_bytes());
    request.extend_from_slice(&a.to_le_bytes());
    request.extend_from_slice(&b.to_le_bytes());
    stream.write_all(&request).await.unwrap();

    let mut response = [0u8; 9];
    stream.read_exact(&mut response).await.unwrap();
    response
}

/// Read until the server closes its end.
pub async fn read_to_close<S: AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
    rest
}
