// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// MethodSet holds the extra method declarations an artifact needs, in
/// the order they were first registered, each at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodSet {
    order: Vec<String>,
    seen: HashSet<[u8; 32]>,
}

fn digest(source: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(source.as_bytes()));
    out
}

impl MethodSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// insert returns false if an identical method was already present.
    pub fn insert(&mut self, source: String) -> bool {
        if !self.seen.insert(digest(&source)) {
            return false;
        }
        self.order.push(source);
        true
    }

    pub fn extend(&mut self, other: MethodSet) {
        for source in other.order {
            self.insert(source);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

#[test]
fn test_method_set_dedup_keeps_first_order() {
    let mut methods = MethodSet::new();
    assert!(methods.insert("b()".to_owned()));
    assert!(methods.insert("a()".to_owned()));
    assert!(!methods.insert("b()".to_owned()));

    let mut other = MethodSet::new();
    other.insert("a()".to_owned());
    other.insert("c()".to_owned());
    methods.extend(other);

    assert_eq!(3, methods.len());
    assert_eq!(vec!["b()", "a()", "c()"], methods.iter().collect::<Vec<_>>());
}
