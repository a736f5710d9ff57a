// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounds-checked little-endian byte cursors.

use crate::codec::CodecError;

/// Forward-only reader over a frame or member body.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($fn:ident, $ty:ty) => {
        pub(crate) fn $fn(&mut self) -> Result<$ty, CodecError> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes = self.read_bytes(N)?;
            let mut raw = [0u8; N];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Remaining bytes, consuming the reader.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    read_le!(read_u8, u8);
    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);
    read_le!(read_i8, i8);
    read_le!(read_i16, i16);
    read_le!(read_i32, i32);
    read_le!(read_i64, i64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);
}

/// Append-only writer with deferred length patching for member headers.
#[derive(Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($fn:ident, $ty:ty) => {
        pub(crate) fn $fn(&mut self, v: $ty) {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    };
}

impl ByteWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    /// Write a placeholder `u32` and return its offset for later patching.
    pub(crate) fn reserve_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.write_u32(0);
        at
    }

    pub(crate) fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    write_le!(write_u8, u8);
    write_le!(write_u16, u16);
    write_le!(write_u32, u32);
    write_le!(write_u64, u64);
    write_le!(write_i8, i8);
    write_le!(write_i16, i16);
    write_le!(write_i32, i32);
    write_le!(write_i64, i64);
    write_le!(write_f32, f32);
    write_le!(write_f64, f64);
}
