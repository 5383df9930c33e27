mod support;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use backhaul::client::tunnel;
use backhaul::net::CopyPump;
use backhaul::protocol::{SessionToken, read_token_line};

#[tokio::test]
async fn bytes_cross_verbatim_both_ways() {
    let target_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let link_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target_listener.local_addr().unwrap().to_string();
    let link_addr = link_listener.local_addr().unwrap().to_string();

    let connector = support::insecure_connector();
    let relay = tokio::spawn(async move {
        tunnel::relay(&target_addr, &link_addr, &connector, None, &CopyPump).await;
    });

    let (mut target, _) = target_listener.accept().await.unwrap();
    let (raw_link, _) = link_listener.accept().await.unwrap();
    let mut link = support::test_acceptor().accept(raw_link).await.unwrap();

    link.write_all(b"from-link").await.unwrap();
    link.flush().await.unwrap();
    let mut buf = [0u8; 9];
    target.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-link");

    target.write_all(b"from-target").await.unwrap();
    let mut buf = [0u8; 11];
    link.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-target");

    drop(target);
    assert!(support::closed_within(&mut link, Duration::from_secs(5)).await);
    drop(link);
    tokio::time::timeout(Duration::from_secs(5), relay)
        .await
        .expect("relay returns once the exchange ends")
        .unwrap();
}

#[tokio::test]
async fn dial_back_leads_with_its_token() {
    let target_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let link_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target_listener.local_addr().unwrap().to_string();
    let link_addr = link_listener.local_addr().unwrap().to_string();

    let token = SessionToken::generate();
    let connector = support::insecure_connector();
    tokio::spawn(async move {
        tunnel::relay(&target_addr, &link_addr, &connector, Some(token), &CopyPump).await;
    });

    let (mut target, _) = target_listener.accept().await.unwrap();
    let (raw_link, _) = link_listener.accept().await.unwrap();
    let mut link = support::test_acceptor().accept(raw_link).await.unwrap();

    assert_eq!(read_token_line(&mut link).await.unwrap(), token);

    target.write_all(b"after-token").await.unwrap();
    let mut buf = [0u8; 11];
    link.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"after-token");
}

#[tokio::test]
async fn unreachable_target_gives_up_quietly() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = unused.local_addr().unwrap().to_string();
    drop(unused);

    let connector = support::insecure_connector();
    let done = support::within(
        Duration::from_secs(5),
        tunnel::relay(&target_addr, "127.0.0.1:1", &connector, None, &CopyPump),
    )
    .await;
    assert!(done);
}
