use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use mqdeliver::codec::{Properties, Protocol, QoS};
use mqdeliver::{ClientId, ConnectionState, DeliveryError, Limits, MessageState};

mod common;
use common::*;

#[test]
fn client_v311_pubrec_sends_pubrel() {
    let (session, _role, sender) = client(Protocol::V311, Limits::default());
    assert_eq!(publish_n(&session, QoS::ExactlyOnce, 7).get(), 7);
    sender.take();

    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x07")).unwrap();

    assert_eq!(outgoing(&session, 7).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
    assert_eq!(sender.take(), vec![pubrel(7)]);
}

#[test]
fn client_v5_error_pubrec_settles_message() {
    let (session, role, sender) = client(Protocol::V5, Limits::new(42, 10));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    role.callbacks().set_on_publish(move |_: &ClientId, id: std::num::NonZeroU16, rc: u8, _: &Properties| {
        c.lock().push((id.get(), rc));
    });

    assert_eq!(publish_n(&session, QoS::ExactlyOnce, 42).get(), 42);
    //no quota left, the next one waits
    assert_eq!(session.publish(message(QoS::ExactlyOnce)).unwrap().map(|id| id.get()), Some(43));
    assert_eq!(sent_publish_ids(&sender.take()).len(), 42);

    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x2A\x97")).unwrap();

    assert!(outgoing(&session, 42).is_none());
    assert_eq!(*calls.lock(), vec![(42, 0x97)]);
    //the freed slot went to the queued message, no PUBREL was sent
    let sent = sender.take();
    assert_eq!(sent_publish_ids(&sent), vec![43]);
    assert_eq!(sent.len(), 1);
    assert_eq!(outgoing(&session, 43).map(|r| r.state()), Some(MessageState::WaitForPubrec));

    //a repeated PUBREC finds nothing and fires no second callback
    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x2A\x97")).unwrap();
    assert_eq!(calls.lock().len(), 1);
    assert!(sender.take().is_empty());
}

#[test]
fn invalid_property_varint_is_malformed() {
    let (session, _role, sender) = client(Protocol::V5, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 7);
    sender.take();

    let err = session.handle_pubrec(&mut frame(b"\x50\x04\x00\x07\x00\x80")).unwrap_err();

    assert!(matches!(err, DeliveryError::MalformedPacket(_)), "{:?}", err);
    assert_eq!(outgoing(&session, 7).map(|r| r.state()), Some(MessageState::WaitForPubrec));
    assert!(sender.take().is_empty());
}

#[test]
fn trailing_bytes_are_malformed() {
    let (session, _role, sender) = client(Protocol::V311, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 1);
    sender.take();
    let err = session.handle_pubrec(&mut frame(b"\x50\x03\x00\x01\x00")).unwrap_err();
    assert!(matches!(err, DeliveryError::MalformedPacket(_)));
    assert!(sender.take().is_empty());
}

#[test]
fn zero_packet_id_is_protocol_error() {
    let (session, _role, sender) = client(Protocol::V311, Limits::default());
    let err = session.handle_pubrec(&mut frame(b"\x50\x02\x00\x00")).unwrap_err();
    assert!(matches!(err, DeliveryError::Protocol(_)));
    assert!(sender.take().is_empty());
}

#[test]
fn reason_code_outside_allow_list_is_protocol_error() {
    let (session, _role, sender) = client(Protocol::V5, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 7);
    sender.take();

    let err = session.handle_pubrec(&mut frame(b"\x50\x03\x00\x07\x05")).unwrap_err();

    assert!(matches!(err, DeliveryError::Protocol(_)));
    assert_eq!(outgoing(&session, 7).map(|r| r.state()), Some(MessageState::WaitForPubrec));
    assert!(sender.take().is_empty());
}

#[test]
fn wrong_flags_are_malformed() {
    let (session, _role, _sender) = client(Protocol::V311, Limits::default());
    let err = session.handle_pubrec(&mut frame(b"\x52\x02\x00\x07")).unwrap_err();
    assert!(matches!(err, DeliveryError::MalformedPacket(_)));
}

#[test]
fn unknown_packet_id_still_answers_pubrel() {
    let (session, _role, sender) = client(Protocol::V5, Limits::default());
    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x09")).unwrap();
    assert_eq!(sender.take(), vec![pubrel(9)]);
}

#[test]
fn pubrec_requires_active_connection() {
    let (session, _role, sender) = client(Protocol::V311, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 1);
    sender.take();
    session.set_state(ConnectionState::Disconnecting);

    let err = session.handle_pubrec(&mut frame(b"\x50\x02\x00\x01")).unwrap_err();

    assert!(matches!(err, DeliveryError::Protocol(_)));
    assert_eq!(outgoing(&session, 1).map(|r| r.state()), Some(MessageState::WaitForPubrec));
    assert!(sender.take().is_empty());
}

#[test]
fn repeated_pubrec_resends_pubrel() {
    let (session, _role, sender) = client(Protocol::V5, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 3);
    sender.take();
    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x03")).unwrap();
    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x03")).unwrap();
    assert_eq!(sender.take(), vec![pubrel(3), pubrel(3)]);
    assert_eq!(outgoing(&session, 3).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
}

#[test]
fn error_pubrec_after_pubrel_is_protocol_error() {
    let (session, _role, sender) = client(Protocol::V5, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 1);
    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x01")).unwrap();
    sender.take();
    let err = session.handle_pubrec(&mut frame(b"\x50\x03\x00\x01\x80")).unwrap_err();
    assert!(matches!(err, DeliveryError::Protocol(_)));
    assert!(sender.take().is_empty());
}

#[test]
fn pubrec_for_qos1_message_is_protocol_error() {
    let (session, _role, _sender) = client(Protocol::V311, Limits::default());
    publish_n(&session, QoS::AtLeastOnce, 1);
    let err = session.handle_pubrec(&mut frame(b"\x50\x02\x00\x01")).unwrap_err();
    assert!(matches!(err, DeliveryError::Protocol(_)));
}

#[test]
fn pubrel_send_failure_is_propagated() {
    let (session, _role, sender) = client(Protocol::V311, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 1);
    sender.set_broken(true);

    let err = session.handle_pubrec(&mut frame(b"\x50\x02\x00\x01")).unwrap_err();

    assert!(matches!(err, DeliveryError::Transport(_)));
    //the record advanced before the send was attempted
    assert_eq!(outgoing(&session, 1).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
}

#[test]
fn callback_may_publish_from_inside() {
    let (session, role, sender) = client(Protocol::V5, Limits::new(1, 10));
    let inner = session.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    role.callbacks().set_on_publish(move |_: &ClientId, _: std::num::NonZeroU16, _: u8, _: &Properties| {
        c.fetch_add(1, Ordering::SeqCst);
        inner.publish(message(QoS::AtLeastOnce)).unwrap();
    });

    publish_n(&session, QoS::ExactlyOnce, 1);
    sender.take();
    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x01\x87")).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sent_publish_ids(&sender.take()), vec![2]);
}

#[test]
fn broker_success_pubrec_sends_pubrel() {
    let (session, _db, sender) = broker(Protocol::V5, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 2);
    sender.take();

    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x02\x10")).unwrap();

    assert_eq!(outgoing(&session, 2).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
    assert_eq!(outgoing(&session, 1).map(|r| r.state()), Some(MessageState::WaitForPubrec));
    assert_eq!(sender.take(), vec![pubrel(2)]);
}

#[test]
fn broker_error_pubrec_deletes_message() {
    let (session, _db, sender) = broker(Protocol::V5, Limits::new(1, 10));
    publish_n(&session, QoS::ExactlyOnce, 2);
    assert_eq!(sent_publish_ids(&sender.take()), vec![1]);

    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x01\x80")).unwrap();

    assert!(outgoing(&session, 1).is_none());
    assert_eq!(sent_publish_ids(&sender.take()), vec![2]);

    //already gone, logged and ignored
    session.handle_pubrec(&mut frame(b"\x50\x03\x00\x01\x80")).unwrap();
    assert!(sender.take().is_empty());
}

#[test]
fn broker_v311_pubrec() {
    let (session, _db, sender) = broker(Protocol::V311, Limits::default());
    publish_n(&session, QoS::ExactlyOnce, 7);
    sender.take();
    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x07")).unwrap();
    assert_eq!(sender.take(), vec![pubrel(7)]);
    assert_eq!(outgoing(&session, 7).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
}

#[test]
fn broker_unknown_packet_id_answers_pubrel() {
    let (session, _db, sender) = broker(Protocol::V311, Limits::default());
    session.handle_pubrec(&mut frame(b"\x50\x02\x01\x00")).unwrap();
    assert_eq!(sender.take(), vec![pubrel(256)]);
}

fn pubrec_keeps_quota_slot(session: &mqdeliver::Session, sender: &Recorder) {
    publish_n(session, QoS::ExactlyOnce, 2);
    assert_eq!(sent_publish_ids(&sender.take()), vec![1]);

    session.handle_pubrec(&mut frame(b"\x50\x02\x00\x01")).unwrap();
    //the slot stays taken until PUBCOMP, the queued message keeps waiting
    assert_eq!(sender.take(), vec![pubrel(1)]);
    assert!(outgoing(session, 2).is_none());
    assert_eq!(session.inflight(mqdeliver::Direction::Outgoing).unwrap().len(), 1);

    session.handle_pubcomp(&mut frame(b"\x70\x02\x00\x01")).unwrap();
    assert_eq!(sent_publish_ids(&sender.take()), vec![2]);
    assert_eq!(outgoing(session, 2).map(|r| r.state()), Some(MessageState::WaitForPubrec));
}

#[test]
fn client_success_pubrec_releases_no_slot() {
    let (session, _role, sender) = client(Protocol::V5, Limits::new(1, 10));
    pubrec_keeps_quota_slot(&session, &sender);
}

#[test]
fn broker_success_pubrec_releases_no_slot() {
    let (session, _db, sender) = broker(Protocol::V5, Limits::new(1, 10));
    pubrec_keeps_quota_slot(&session, &sender);
}
