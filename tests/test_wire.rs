// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tests for the wire records: layouts, byte round-trips, name fields, and
// the reserved control values.

use gtipc::wire::{
    copy_name, name_str, RegistryCommand, RegistryRecord, RequestRecord, ResponseRecord,
    ServiceId, CONTROL_ID, CTRL_RESIZE_DONE, CTRL_SERVER_CLOSE, MAX_NAME_LEN,
};

// ===========================================================================
// Layout
// ===========================================================================

#[test]
fn record_sizes_are_the_wire_contract() {
    // cmd + pid + three 64-byte names + initial_capacity
    assert_eq!(RegistryRecord::WIRE_SIZE, 4 + 4 + 3 * MAX_NAME_LEN + 4);
    // request_id + service + entry_idx + pid
    assert_eq!(RequestRecord::WIRE_SIZE, 16);
    // request_id + entry_idx
    assert_eq!(ResponseRecord::WIRE_SIZE, 8);
}

#[test]
fn control_values_are_reserved() {
    assert_eq!(CONTROL_ID, -1);
    // The two control codes must stay distinguishable in entry_idx.
    assert_ne!(CTRL_RESIZE_DONE, CTRL_SERVER_CLOSE);
}

// ===========================================================================
// Byte round-trips
// ===========================================================================

#[test]
fn registry_record_roundtrip() {
    let rec = RegistryRecord::new(
        RegistryCommand::Register,
        4242,
        "/req_q",
        "/rsp_q",
        "/shm_obj",
        32,
    );
    let bytes = rec.as_bytes();
    assert_eq!(bytes.len(), RegistryRecord::WIRE_SIZE);

    let back = RegistryRecord::from_bytes(bytes).expect("from_bytes");
    assert_eq!(back.cmd, RegistryCommand::Register as u32);
    assert_eq!(back.pid, 4242);
    assert_eq!(back.send_queue_str(), "/req_q");
    assert_eq!(back.recv_queue_str(), "/rsp_q");
    assert_eq!(back.shm_str(), "/shm_obj");
    assert_eq!(back.initial_capacity, 32);
}

#[test]
fn request_record_roundtrip() {
    let rec = RequestRecord {
        request_id: 7,
        service: ServiceId::Mul as u32,
        entry_idx: 3,
        pid: 99,
    };
    let back = RequestRecord::from_bytes(rec.as_bytes()).expect("from_bytes");
    assert_eq!(back.request_id, 7);
    assert_eq!(back.service, 1);
    assert_eq!(back.entry_idx, 3);
    assert_eq!(back.pid, 99);
}

#[test]
fn response_record_roundtrip() {
    let rec = ResponseRecord {
        request_id: 11,
        entry_idx: 5,
    };
    let back = ResponseRecord::from_bytes(rec.as_bytes()).expect("from_bytes");
    assert_eq!(back.request_id, 11);
    assert_eq!(back.entry_idx, 5);
}

#[test]
fn from_bytes_rejects_wrong_size() {
    let short = [0u8; 3];
    assert!(RequestRecord::from_bytes(&short).is_none());
    assert!(ResponseRecord::from_bytes(&short).is_none());
    assert!(RegistryRecord::from_bytes(&short).is_none());
}

// ===========================================================================
// Control records
// ===========================================================================

#[test]
fn resize_notice_uses_sentinel() {
    let rec = RequestRecord::resize_notice(123);
    assert_eq!(rec.request_id, CONTROL_ID);
    assert_eq!(rec.pid, 123);
}

#[test]
fn control_responses_carry_their_codes() {
    let done = ResponseRecord::resize_done();
    assert_eq!(done.request_id, CONTROL_ID);
    assert_eq!(done.entry_idx, CTRL_RESIZE_DONE);

    let close = ResponseRecord::server_close();
    assert_eq!(close.request_id, CONTROL_ID);
    assert_eq!(close.entry_idx, CTRL_SERVER_CLOSE);
}

// ===========================================================================
// Name fields
// ===========================================================================

#[test]
fn name_field_truncates_and_terminates() {
    let mut field = [0xffu8; MAX_NAME_LEN];
    let long = "n".repeat(MAX_NAME_LEN * 2);
    copy_name(&mut field, &long);
    assert_eq!(field[MAX_NAME_LEN - 1], 0);
    assert_eq!(name_str(&field).len(), MAX_NAME_LEN - 1);
}

#[test]
fn name_field_roundtrip() {
    let mut field = [0u8; MAX_NAME_LEN];
    copy_name(&mut field, "/gtipc_req_1_0");
    assert_eq!(name_str(&field), "/gtipc_req_1_0");
}

// ===========================================================================
// Selectors and commands
// ===========================================================================

#[test]
fn service_selector_decode() {
    assert_eq!(ServiceId::from_u32(0), Some(ServiceId::Add));
    assert_eq!(ServiceId::from_u32(1), Some(ServiceId::Mul));
    assert_eq!(ServiceId::from_u32(99), None);
}

#[test]
fn registry_command_decode() {
    assert_eq!(RegistryCommand::from_u32(0), Some(RegistryCommand::Register));
    assert_eq!(
        RegistryCommand::from_u32(3),
        Some(RegistryCommand::ServerClose)
    );
    assert_eq!(RegistryCommand::from_u32(42), None);
}
