/*
 * This file is a part of respd
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use super::*;

fn roundtrip(v: &RespValue) {
    let bytes = v.to_bytes();
    let (parsed, consumed) = Parser::parse(&bytes).expect("should parse");
    assert_eq!(consumed, bytes.len());
    assert_eq!(&parsed, v);
}

#[test]
fn roundtrip_all_variants() {
    roundtrip(&RespValue::ok());
    roundtrip(&RespValue::simple("PONG"));
    roundtrip(&RespValue::error("ERR broken"));
    roundtrip(&RespValue::Integer(-42));
    roundtrip(&RespValue::Integer(0));
    roundtrip(&RespValue::bulk(&b"hello"[..]));
    roundtrip(&RespValue::bulk(&b""[..]));
    roundtrip(&RespValue::NullBulk);
    roundtrip(&RespValue::NullArray);
    roundtrip(&RespValue::array(vec![
        RespValue::bulk(&b"a"[..]),
        RespValue::Integer(1),
        RespValue::array(vec![RespValue::NullBulk]),
    ]));
}

#[test]
fn ping_frame_matches_literal_wire_bytes() {
    let frame = command_frame(vec![&b"PING"[..]]);
    assert_eq!(frame.to_bytes().as_ref(), b"*1\r\n$4\r\nPING\r\n");
}

#[test]
fn empty_buffer_is_empty_not_not_enough() {
    assert_eq!(Parser::parse(&[]), Err(ParseError::Empty));
}

#[test]
fn partial_bulk_header_needs_more_data() {
    assert_eq!(Parser::parse(b"$5\r\nhel"), Err(ParseError::NotEnough));
}

#[test]
fn partial_array_count_needs_more_data() {
    assert_eq!(Parser::parse(b"*2\r\n$1\r\na\r\n"), Err(ParseError::NotEnough));
}

#[test]
fn garbage_leading_byte_is_invalid() {
    assert_eq!(Parser::parse(b"!ohno\r\n"), Err(ParseError::Invalid));
}

#[test]
fn oversized_bulk_length_is_invalid() {
    let frame = format!("${}\r\n", MAX_BULK_LEN + 1);
    assert_eq!(Parser::parse(frame.as_bytes()), Err(ParseError::Invalid));
}

#[test]
fn oversized_array_count_is_invalid_without_allocating_it() {
    let frame = format!("*{}\r\n", MAX_ARRAY_LEN + 1);
    assert_eq!(Parser::parse(frame.as_bytes()), Err(ParseError::Invalid));
}

#[test]
fn parser_incrementality_for_every_split_point() {
    let full = command_frame(vec![&b"SET"[..], &b"foo"[..], &b"bar"[..]]).to_bytes();
    for split in 0..=full.len() {
        let (head, tail) = full.split_at(split);
        // feed head first
        match Parser::parse(head) {
            Ok((_, consumed)) => {
                // a complete frame was already present in the head alone; this can only
                // happen at split == full.len()
                assert_eq!(split, full.len());
                assert_eq!(consumed, full.len());
                continue;
            }
            Err(ParseError::NotEnough) | Err(ParseError::Empty) => {}
            Err(ParseError::Invalid) => panic!("valid prefix reported as invalid"),
        }
        // now feed the whole thing back (simulating "more bytes arrived")
        let mut combined = head.to_vec();
        combined.extend_from_slice(tail);
        let (value, consumed) = Parser::parse(&combined).expect("complete frame must parse");
        assert_eq!(consumed, combined.len());
        assert_eq!(frame_into_argv(value).unwrap().len(), 3);
    }
}

#[test]
fn frame_into_argv_rejects_non_bulk_elements() {
    let value = RespValue::Array(vec![RespValue::Integer(1)]);
    assert!(frame_into_argv(value).is_none());
}

#[test]
fn frame_into_argv_rejects_non_array() {
    assert!(frame_into_argv(RespValue::Integer(1)).is_none());
}
