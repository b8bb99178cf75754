// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;

use crate::{
    Result,
    error::{DecodeSnafu, EncodeSnafu},
};

/// Converts queue items to and from their stored bytes.
pub trait Codec: Send {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Self::Item>;
}

/// Stores items as JSON documents.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T> std::fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T: Serialize + DeserializeOwned> Codec for JsonCodec<T> {
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>> { serde_json::to_vec(item).context(EncodeSnafu) }

    fn decode(&self, data: &[u8]) -> Result<T> { serde_json::from_slice(data).context(DecodeSnafu) }
}

/// Stores items verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Item = Bytes;

    fn encode(&self, item: &Bytes) -> Result<Vec<u8>> { Ok(item.to_vec()) }

    fn decode(&self, data: &[u8]) -> Result<Bytes> { Ok(Bytes::copy_from_slice(data)) }
}
