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

use std::path::{Component, Path, PathBuf};

use snafu::ensure;

use crate::{Result, error::InvalidPathSnafu};

/// Returns the queue file path for `tag` inside `base`: `base/<tag>`.
///
/// The tag must be a single plain file name so that one instance never
/// escapes its queue directory.
pub fn queue_file_path<P: AsRef<Path>>(base: P, tag: &str) -> Result<PathBuf> {
    let path = base.as_ref().join(tag);
    let mut components = Path::new(tag).components();
    let single_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    ensure!(single_name, InvalidPathSnafu { path });
    Ok(path)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_queue_file_path() {
        let path = queue_file_path("/data/beacon", "write-key-payloads").unwrap();
        assert_eq!(path, PathBuf::from("/data/beacon/write-key-payloads"));
    }

    #[test_case("" ; "empty")]
    #[test_case("." ; "current dir")]
    #[test_case("../escape" ; "parent dir")]
    #[test_case("nested/tag" ; "nested")]
    #[test_case("/absolute" ; "absolute")]
    fn test_rejects_non_file_name_tag(tag: &str) {
        assert!(queue_file_path("/data/beacon", tag).is_err());
    }
}
