// ABOUTME: Integration tests for the live connection registry
// ABOUTME: Covers multi-socket users, room broadcast under concurrency, reaper eviction, and shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{client, init_test_logging, trainer};
use fitpro_core::constants::close_codes;
use fitpro_core::errors::RegistryError;
use fitpro_core::models::{SessionId, UserId};
use fitpro_live::registry::{ConnectionRegistry, SocketHandle};
use fitpro_live::websocket::protocol::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn registry(timeout_secs: u64) -> Arc<ConnectionRegistry> {
    init_test_logging();
    Arc::new(ConnectionRegistry::new(Duration::from_secs(timeout_secs)))
}

#[tokio::test]
async fn test_user_with_two_sockets() {
    let registry = registry(90);
    let room = SessionId::new("yoga");
    let (phone, mut phone_rx) = SocketHandle::channel(8);
    let (laptop, mut laptop_rx) = SocketHandle::channel(8);

    let phone_id = registry.register(client(), phone).unwrap();
    let laptop_id = registry.register(client(), laptop).unwrap();
    assert_eq!(registry.user_connection_count(&client()), 2);

    registry.join_room(phone_id, &room).unwrap();
    registry.join_room(laptop_id, &room).unwrap();

    // Targeted send reaches exactly one socket
    assert!(registry
        .send_to_connection(phone_id, ServerMessage::success("direct"))
        .unwrap());
    assert_eq!(
        phone_rx.outbound.try_recv().unwrap(),
        ServerMessage::success("direct")
    );
    assert!(laptop_rx.outbound.try_recv().is_err());

    // Broadcast reaches both
    assert_eq!(registry.broadcast(&room, &ServerMessage::success("all")), 2);
    assert!(phone_rx.outbound.try_recv().is_ok());
    assert!(laptop_rx.outbound.try_recv().is_ok());

    // Dropping one socket leaves the other intact
    registry.unregister(phone_id).unwrap();
    assert_eq!(registry.user_connection_count(&client()), 1);
    assert_eq!(registry.room_members(&room), vec![laptop_id]);
    assert!(registry
        .send_to_user(&client(), &ServerMessage::success("still here"))
        .unwrap());
}

#[tokio::test]
async fn test_broadcast_never_reaches_departed_or_other_rooms() {
    let registry = registry(90);
    let yoga = SessionId::new("yoga");
    let hiit = SessionId::new("hiit");

    let (a, mut a_rx) = SocketHandle::channel(8);
    let (b, mut b_rx) = SocketHandle::channel(8);
    let a_id = registry.register(trainer(), a).unwrap();
    let b_id = registry.register(client(), b).unwrap();

    registry.join_room(a_id, &yoga).unwrap();
    registry.join_room(b_id, &yoga).unwrap();
    assert!(registry.leave_room(b_id, &yoga).unwrap());
    assert!(!registry.leave_room(b_id, &yoga).unwrap());
    registry.join_room(b_id, &hiit).unwrap();

    assert_eq!(registry.broadcast(&yoga, &ServerMessage::success("yoga")), 1);
    assert!(a_rx.outbound.try_recv().is_ok());
    assert!(b_rx.outbound.try_recv().is_err());
    assert_eq!(registry.room_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_and_leaves_keep_indexes_consistent() {
    let registry = registry(90);
    let room = SessionId::new("crowded");

    let mut tasks = Vec::new();
    for i in 0..32 {
        let registry = Arc::clone(&registry);
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            let (handle, endpoint) = SocketHandle::channel(64);
            let user = UserId::new(format!("user-{i}"));
            let id = registry.register(user, handle).unwrap();
            registry.join_room(id, &room).unwrap();
            tokio::task::yield_now().await;
            // Odd members leave again; even members stay
            if i % 2 == 1 {
                registry.unregister(id).unwrap();
            }
            (i, id, endpoint)
        }));
    }

    let mut endpoints = Vec::new();
    for task in tasks {
        endpoints.push(task.await.unwrap());
    }

    let members = registry.room_members(&room);
    assert_eq!(members.len(), 16);
    assert_eq!(registry.broadcast(&room, &ServerMessage::success("hi")), 16);

    for (i, id, mut endpoint) in endpoints {
        let got = endpoint.outbound.try_recv().is_ok();
        assert_eq!(got, i % 2 == 0, "member {i} ({id})");
    }
}

#[tokio::test]
async fn test_reregistering_same_socket_is_rejected() {
    let registry = registry(90);
    let (handle, _endpoint) = SocketHandle::channel(4);
    registry.register(trainer(), handle.clone()).unwrap();
    let err = registry.register(trainer(), handle).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateConnection { .. }));
    assert_eq!(registry.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_evicts_silent_connection_within_timeout() {
    let registry = registry(3);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = registry.spawn_reaper(shutdown_rx);

    let (silent, mut silent_rx) = SocketHandle::channel(4);
    let (chatty, chatty_rx) = SocketHandle::channel(4);
    let silent_id = registry.register(client(), silent).unwrap();
    let chatty_id = registry.register(trainer(), chatty).unwrap();
    registry.join_room(silent_id, &SessionId::new("s")).unwrap();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        registry.heartbeat(chatty_id).unwrap();
    }
    // One sweep period past the timeout is enough
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(registry.connection_user(silent_id).is_none());
    assert!(registry.room_members(&SessionId::new("s")).is_empty());
    assert!(registry.connection_user(chatty_id).is_some());

    silent_rx.close.changed().await.unwrap();
    let reason = silent_rx.close.borrow().clone().unwrap();
    assert_eq!(reason.code, close_codes::GOING_AWAY);
    assert!(chatty_rx.close.borrow().is_none());

    shutdown_tx.send_replace(true);
    reaper.await.unwrap();
}

#[tokio::test]
async fn test_close_all_closes_everyone_and_refuses_new_work() {
    let registry = registry(90);
    let (a, a_rx) = SocketHandle::channel(4);
    let (b, b_rx) = SocketHandle::channel(4);
    registry.register(trainer(), a).unwrap();
    registry.register(client(), b).unwrap();

    assert_eq!(registry.close_all(close_codes::NORMAL), 2);
    assert_eq!(registry.connection_count(), 0);
    for rx in [a_rx, b_rx] {
        assert_eq!(rx.close.borrow().as_ref().unwrap().code, close_codes::NORMAL);
    }

    let (late, _late_rx) = SocketHandle::channel(4);
    assert!(matches!(
        registry.register(trainer(), late),
        Err(RegistryError::ShuttingDown)
    ));
    assert!(matches!(
        registry.send_to_user(&trainer(), &ServerMessage::success("x")),
        Err(RegistryError::ShuttingDown)
    ));
}
