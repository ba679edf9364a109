//! # Consumer Flow Scenarios
//!
//! Prefetch, drain and release behaviour of transacted consumers.

#[cfg(test)]
mod tests {
    use crate::peer::{DischargeReply, DrainReply, TestPeer};
    use quay_transactions::domain::invariants::{invariant_release_count, released_count};
    use quay_transactions::{ErrorClass, TransactedSession, TransactionConfig, TransactionError};
    use shared_types::entities::LinkHandle;
    use shared_types::frames::{Control, Flow, Frame};
    use std::sync::Arc;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn config() -> TransactionConfig {
        TransactionConfig {
            request_timeout_ms: 200,
            drain_timeout_ms: 100,
            ..TransactionConfig::default()
        }
    }

    async fn session_with_messages(count: usize, prefetch: u32) -> (TransactedSession, Arc<TestPeer>, LinkHandle) {
        let peer = TestPeer::new();
        peer.enqueue("myQueue", (0..count).map(|i| format!("message-{}", i).into_bytes()));
        let mut session = TransactedSession::open(config(), peer.wire()).await.unwrap();
        let consumer = session.create_consumer("myQueue", Some(prefetch)).await.unwrap();
        (session, peer, consumer)
    }

    fn flows(frames: &[Frame], handle: LinkHandle) -> Vec<Flow> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Flow(flow) if flow.handle == handle => Some(flow.clone()),
                _ => None,
            })
            .collect()
    }

    fn position(frames: &[Frame], predicate: impl Fn(&Frame) -> bool) -> usize {
        frames
            .iter()
            .position(predicate)
            .unwrap_or_else(|| panic!("frame not found in {:?}", frames))
    }

    // =========================================================================
    // ROLLBACK
    // =========================================================================

    #[tokio::test]
    async fn test_rollback_drains_releases_and_restarts() {
        let (mut session, peer, consumer) = session_with_messages(5, 5).await;
        for _ in 0..2 {
            assert!(session.receive(consumer, None).await.unwrap().is_some());
        }
        peer.clear();

        session.rollback().await.unwrap();
        let frames = peer.frames();

        let consumer_flows = flows(&frames, consumer);
        let drain = &consumer_flows[0];
        assert!(drain.drain);
        assert!(drain.link_credit > 0);
        let restart = consumer_flows.last().unwrap();
        assert!(!restart.drain);
        assert_eq!(restart.link_credit, 5);

        assert!(invariant_release_count(&frames, 5, 2));

        let drain_at = position(&frames, |f| matches!(f, Frame::Flow(flow) if flow.drain));
        let discharge_at = position(&frames, |f| {
            matches!(f, Frame::Transfer(t) if matches!(t.control_body(), Some(Control::Discharge { fail: true, .. })))
        });
        let release_at = position(&frames, |f| matches!(f, Frame::Disposition(_)));
        let declare_at = position(&frames, |f| {
            matches!(f, Frame::Transfer(t) if t.control_body() == Some(&Control::Declare))
        });
        let restart_at = frames
            .iter()
            .rposition(|f| matches!(f, Frame::Flow(flow) if !flow.drain))
            .unwrap();
        assert!(drain_at < discharge_at);
        assert!(discharge_at < release_at);
        assert!(release_at < declare_at);
        assert!(declare_at < restart_at);
    }

    #[tokio::test]
    async fn test_rejected_rollback_still_releases_and_restarts() {
        let (mut session, peer, consumer) = session_with_messages(5, 5).await;
        for _ in 0..2 {
            assert!(session.receive(consumer, None).await.unwrap().is_some());
        }
        peer.script_discharge(DischargeReply::Reject(None));
        peer.clear();

        let err = session.rollback().await.unwrap_err();
        assert!(matches!(err, TransactionError::RollbackFailed(_)));
        assert_eq!(err.class(), ErrorClass::Jms);

        let frames = peer.frames();
        assert_eq!(released_count(&frames), 3);
        assert!(invariant_release_count(&frames, 5, 2));
        let restart = flows(&frames, consumer).last().cloned().unwrap();
        assert!(!restart.drain);
        assert_eq!(restart.link_credit, 5);
        assert_eq!(session.current_txn_id(), Some(TestPeer::txn_id(2)));
    }

    #[tokio::test]
    async fn test_released_messages_are_redelivered() {
        let (mut session, peer, consumer) = session_with_messages(3, 5).await;
        session.receive(consumer, None).await.unwrap();
        session.rollback().await.unwrap();

        // The two released messages come back on the restart credit.
        assert_eq!(peer.queue_depth("myQueue"), 0);
        let mut redelivered = 0;
        while session.receive(consumer, None).await.unwrap().is_some() {
            redelivered += 1;
        }
        assert_eq!(redelivered, 2);
    }

    #[tokio::test]
    async fn test_full_prefetch_is_not_drained() {
        let (mut session, peer, consumer) = session_with_messages(5, 5).await;
        peer.clear();

        session.rollback().await.unwrap();
        let frames = peer.frames();

        let consumer_flows = flows(&frames, consumer);
        assert!(consumer_flows.iter().all(|flow| !flow.drain));
        assert_eq!(released_count(&frames), 5);
        assert_eq!(consumer_flows.last().map(|flow| flow.link_credit), Some(5));
    }

    #[tokio::test]
    async fn test_drain_completed_by_transfers() {
        let (mut session, peer, consumer) = session_with_messages(2, 5).await;
        peer.set_drain_reply(DrainReply::Transfers);
        peer.clear();

        session.rollback().await.unwrap();
        let frames = peer.frames();

        assert_eq!(flows(&frames, consumer)[0].link_credit, 3);
        // Two real messages plus three fillers sent in answer to the drain.
        assert_eq!(released_count(&frames), 5);
    }

    #[tokio::test]
    async fn test_unanswered_drain_times_out() {
        let (mut session, peer, consumer) = session_with_messages(1, 5).await;
        peer.set_drain_reply(DrainReply::Silent);
        peer.clear();

        session.rollback().await.unwrap();
        let consumer_flows = flows(&peer.frames(), consumer);
        assert!(consumer_flows[0].drain);
        assert_eq!(consumer_flows.last().map(|flow| flow.drain), Some(false));
    }

    #[tokio::test]
    async fn test_commit_leaves_consumers_alone() {
        let (mut session, peer, consumer) = session_with_messages(3, 5).await;
        session.receive(consumer, None).await.unwrap();
        peer.clear();

        session.commit().await.unwrap();
        let frames = peer.frames();
        assert!(flows(&frames, consumer).is_empty());
        assert_eq!(released_count(&frames), 0);
    }

    #[tokio::test]
    async fn test_idle_consumer_keeps_full_prefetch_while_another_is_busy() {
        let peer = TestPeer::new();
        peer.enqueue("bulk", (0..1000).map(|i| format!("bulk-{}", i).into_bytes()));
        peer.enqueue("side", (0..100).map(|i| format!("side-{}", i).into_bytes()));
        let mut session = TransactedSession::open(config(), peer.wire()).await.unwrap();

        let bulk = session.create_consumer("bulk", Some(1000)).await.unwrap();
        let side = session.create_consumer("side", Some(100)).await.unwrap();
        while session.receive(side, None).await.unwrap().is_some() {}
        session.commit().await.unwrap();

        assert_eq!(session.context_mut().consumers_mut().buffered(bulk), Some(1000));
        peer.clear();

        session.rollback().await.unwrap();
        assert_eq!(released_count(&peer.frames()), 1000);
        assert_eq!(peer.queue_depth("bulk"), 0);
    }

    // =========================================================================
    // ACKNOWLEDGEMENTS
    // =========================================================================

    #[tokio::test]
    async fn test_receive_after_coordinator_loss_sends_no_ack() {
        let (mut session, peer, consumer) = session_with_messages(1, 5).await;
        peer.close_coordinator(None).await;
        peer.clear();

        let delivery = session.receive(consumer, None).await.unwrap();
        assert!(delivery.is_some());
        assert!(!peer
            .frames()
            .iter()
            .any(|f| matches!(f, Frame::Disposition(_))));
    }

    // =========================================================================
    // CONSUMER CLOSE
    // =========================================================================

    #[tokio::test]
    async fn test_closed_consumer_is_not_restarted() {
        let (mut session, peer, consumer) = session_with_messages(3, 5).await;

        assert_eq!(session.close_consumer(consumer).await.unwrap(), 3);
        peer.clear();

        session.rollback().await.unwrap();
        assert!(flows(&peer.frames(), consumer).is_empty());
        assert!(matches!(
            session.receive(consumer, None).await,
            Err(TransactionError::UnknownLink(_))
        ));
    }

    #[tokio::test]
    async fn test_remotely_detached_consumer_is_dropped() {
        let (mut session, peer, consumer) = session_with_messages(0, 5).await;
        peer.close_consumer(consumer).await;
        peer.clear();

        session.rollback().await.unwrap();
        assert!(flows(&peer.frames(), consumer).is_empty());
        assert!(!session.context().consumers().contains(consumer));
    }
}
