//! Paging over every stored point.
//!
//! Pages follow the sorted relative paths of the point files. The offset
//! handed back is the last path returned, so paging stays stable while
//! files before the cursor are added or removed.

use std::path::Path;
use std::sync::Arc;

use super::FilesystemVectorStore;
use crate::error::{StoreError, StoreResult};
use crate::storage::{read_record, scan_point_files};
use crate::types::{ScrollPage, ScrollRequest, ScrolledPoint};

impl FilesystemVectorStore {
    /// One page of points of `name` in storage order.
    pub fn scroll_points(&self, name: &str, request: &ScrollRequest) -> StoreResult<ScrollPage> {
        let dir = self.collection_dir(name)?;
        if request.limit == 0 {
            return Err(StoreError::InvalidArgument {
                reason: "scroll limit must be greater than zero".to_string(),
            });
        }

        let files = self.file_list(name, &dir);
        let start = match request.offset.as_deref() {
            Some(offset) => files.partition_point(|path| path.as_str() <= offset),
            None => 0,
        };

        let mut points = Vec::with_capacity(request.limit);
        let mut last_seen = None;
        let mut position = start;
        while position < files.len() && points.len() < request.limit {
            let relative = &files[position];
            position += 1;
            last_seen = Some(relative.clone());

            let record = match read_record(&dir.join(relative)) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(file = %relative, "skipping point during scroll: {e}");
                    continue;
                }
            };
            if let Some(filter) = &request.filter
                && !filter.matches(&record.payload)
            {
                continue;
            }
            points.push(ScrolledPoint {
                id: record.id,
                payload: request.with_payload.then_some(record.payload),
                vector: request.with_vector.then_some(record.vector),
            });
        }

        let next_offset = if position < files.len() {
            last_seen
        } else {
            None
        };
        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    /// Sorted point file paths relative to the collection, cached until the
    /// next write.
    fn file_list(&self, name: &str, dir: &Path) -> Arc<Vec<String>> {
        if let Some(files) = self.file_lists.lock().get(name) {
            return Arc::clone(files);
        }

        let mut files: Vec<String> = scan_point_files(dir)
            .into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(dir).ok()?;
                let parts: Vec<&str> = relative
                    .components()
                    .map(|c| c.as_os_str().to_str())
                    .collect::<Option<_>>()?;
                Some(parts.join("/"))
            })
            .collect();
        files.sort();

        let files = Arc::new(files);
        self.file_lists
            .lock()
            .insert(name.to_string(), Arc::clone(&files));
        files
    }
}
