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

fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

#[test]
fn get_on_absent_key_is_none() {
    let mut s = Store::new();
    assert_eq!(s.get(b"nope".as_slice(), 0).unwrap(), None);
}

#[test]
fn set_then_get_roundtrips() {
    let mut s = Store::new();
    s.set(b("k"), b("v"), None);
    assert_eq!(s.get(b"k", 0).unwrap(), Some(b("v")));
}

#[test]
fn expired_string_reads_as_absent_and_is_removed() {
    let mut s = Store::new();
    s.set(b("k"), b("v"), Some(100));
    assert_eq!(s.get(b"k", 50).unwrap(), Some(b("v")));
    assert_eq!(s.get(b"k", 150).unwrap(), None);
    assert_eq!(s.exists(b"k", 150), false);
}

#[test]
fn set_clears_prior_ttl_when_none_given() {
    let mut s = Store::new();
    s.set(b("k"), b("v"), Some(10));
    s.set(b("k"), b("v2"), None);
    assert_eq!(s.get(b"k", 10_000).unwrap(), Some(b("v2")));
}

#[test]
fn incr_from_absent_starts_at_one() {
    let mut s = Store::new();
    assert_eq!(s.incr(&b("counter"), 0).unwrap(), 1);
    assert_eq!(s.incr(&b("counter"), 0).unwrap(), 2);
}

#[test]
fn incr_on_non_integer_string_errors() {
    let mut s = Store::new();
    s.set(b("k"), b("notanumber"), None);
    assert_eq!(s.incr(&b("k"), 0), Err(StoreError::NotAnInteger));
}

#[test]
fn wrongtype_on_get_does_not_mutate_store() {
    let mut s = Store::new();
    s.lpush(b("k"), &[b("a")], 0).unwrap();
    assert_eq!(s.get(b"k", 0), Err(StoreError::WrongType));
    // still a list with the one element, untouched
    assert_eq!(s.llen(b"k", 0).unwrap(), 1);
}

#[test]
fn lpush_rpush_and_lrange_order() {
    let mut s = Store::new();
    s.rpush(b("l"), &[b("a"), b("b")], 0).unwrap(); // [a, b]
    s.lpush(b("l"), &[b("z")], 0).unwrap(); // [z, a, b]
    let all = s.lrange(b"l", 0, -1, 0).unwrap();
    assert_eq!(all, vec![b("z"), b("a"), b("b")]);
}

#[test]
fn lpop_deletes_key_when_list_emptied() {
    let mut s = Store::new();
    s.rpush(b("l"), &[b("only")], 0).unwrap();
    assert_eq!(s.lpop(b"l", 0).unwrap(), Some(b("only")));
    assert_eq!(s.exists(b"l", 0), false);
    assert_eq!(s.lpop(b"l", 0).unwrap(), None);
}

#[test]
fn lrange_negative_indices() {
    let mut s = Store::new();
    s.rpush(b("l"), &[b("a"), b("b"), b("c")], 0).unwrap();
    assert_eq!(s.lrange(b"l", -2, -1, 0).unwrap(), vec![b("b"), b("c")]);
}

#[test]
fn del_counts_only_existing_keys() {
    let mut s = Store::new();
    s.set(b("a"), b("1"), None);
    assert_eq!(s.del(&[b("a"), b("missing")]), 1);
}

#[test]
fn xadd_rejects_id_equal_or_smaller_than_last() {
    let mut s = Store::new();
    let id = s.xadd(b("s"), StreamIdSpec::parse("1-1").unwrap(), vec![(b("k"), b("v"))]).unwrap();
    assert_eq!(id, StreamId::new(1, 1));
    assert_eq!(
        s.xadd(b("s"), StreamIdSpec::parse("1-1").unwrap(), vec![(b("k"), b("v"))]),
        Err(StoreError::XaddIdTooSmall)
    );
    assert_eq!(
        s.xadd(b("s"), StreamIdSpec::parse("0-5").unwrap(), vec![(b("k"), b("v"))]),
        Err(StoreError::XaddIdTooSmall)
    );
}

#[test]
fn xadd_autoseq_increments_within_same_ms() {
    let mut s = Store::new();
    s.xadd(b("s"), StreamIdSpec::parse("5-*").unwrap(), vec![(b("a"), b("1"))]).unwrap();
    let second = s.xadd(b("s"), StreamIdSpec::parse("5-*").unwrap(), vec![(b("a"), b("2"))]).unwrap();
    assert_eq!(second, StreamId::new(5, 1));
}

#[test]
fn xrange_is_inclusive_and_ordered() {
    let mut s = Store::new();
    s.xadd(b("s"), StreamIdSpec::parse("1-1").unwrap(), vec![(b("a"), b("1"))]).unwrap();
    s.xadd(b("s"), StreamIdSpec::parse("2-1").unwrap(), vec![(b("a"), b("2"))]).unwrap();
    s.xadd(b("s"), StreamIdSpec::parse("3-1").unwrap(), vec![(b("a"), b("3"))]).unwrap();
    let got = s.xrange(b"s", StreamId::new(1, 1), StreamId::new(2, 1)).unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].id, StreamId::new(1, 1));
    assert_eq!(got[1].id, StreamId::new(2, 1));
}

#[test]
fn xread_since_is_strictly_greater_than_baseline() {
    let mut s = Store::new();
    s.xadd(b("s"), StreamIdSpec::parse("1-1").unwrap(), vec![(b("a"), b("1"))]).unwrap();
    assert!(s.xread_since(b"s", StreamId::new(1, 1)).unwrap().is_empty());
    s.xadd(b("s"), StreamIdSpec::parse("1-2").unwrap(), vec![(b("a"), b("2"))]).unwrap();
    assert_eq!(s.xread_since(b"s", StreamId::new(1, 1)).unwrap().len(), 1);
}

#[test]
fn stream_monotonicity_after_many_xadds() {
    let mut s = Store::new();
    let mut max = StreamId::MIN;
    for ms in 1..10u64 {
        let id = s.xadd(b("s"), StreamIdSpec::Explicit(StreamId::new(ms, 0)), vec![]).unwrap();
        assert!(id > max);
        max = id;
    }
    assert_eq!(s.stream_last_id(b"s").unwrap(), max);
}

#[test]
fn type_name_reports_none_for_absent_key() {
    let mut s = Store::new();
    assert_eq!(s.type_of(b"nope", 0), "none");
}
