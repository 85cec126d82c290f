//! Source info cleanup for rewritten options.
//!
//! A rewritten option's source location still points at the text of the old
//! value. The modifier marks each changed option's source path; sweeping
//! removes exactly those locations. The sweeper holds the image for the
//! whole pass and sweeps on drop if the pass ends early, so an aborted pass
//! never leaves stale locations behind for options it already changed.

use crate::error::Result;
use crate::image::Image;
use std::collections::{HashMap, HashSet};
use tracing::{trace, warn};

pub(crate) struct MarkSweeper<'a> {
    image: &'a mut Image,
    marks: HashMap<String, HashSet<Vec<i32>>>,
}

impl<'a> MarkSweeper<'a> {
    pub(crate) fn new(image: &'a mut Image) -> Self {
        Self {
            image,
            marks: HashMap::new(),
        }
    }

    pub(crate) fn image_mut(&mut self) -> &mut Image {
        self.image
    }

    /// Records that the option at `source_path` in `path` was rewritten
    pub(crate) fn mark(&mut self, path: &str, source_path: Vec<i32>) {
        trace!("Marking {:?} in {}", source_path, path);
        self.marks.entry(path.to_string()).or_default().insert(source_path);
    }

    /// Removes every marked location; returns how many were removed.
    pub(crate) fn sweep(mut self) -> Result<usize> {
        self.sweep_marked()
    }

    fn sweep_marked(&mut self) -> Result<usize> {
        let marks = std::mem::take(&mut self.marks);
        let mut removed = 0;
        for (path, source_paths) in marks {
            if let Some(file) = self.image.get_file_mut(&path) {
                removed += file.descriptor_mut().remove_source_locations(&source_paths)?;
            }
        }
        Ok(removed)
    }
}

impl Drop for MarkSweeper<'_> {
    fn drop(&mut self) {
        if self.marks.is_empty() {
            return;
        }
        if let Err(err) = self.sweep_marked() {
            warn!("Failed to remove source info for rewritten options: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileDescriptorMessage;
    use crate::image::ImageFile;
    use prost_types::source_code_info::Location;
    use prost_types::{FileDescriptorProto, SourceCodeInfo};

    fn image() -> Image {
        let location = |path: Vec<i32>| Location {
            path,
            ..Default::default()
        };
        let descriptor = FileDescriptorMessage::from_proto(FileDescriptorProto {
            name: Some("a.proto".to_string()),
            source_code_info: Some(SourceCodeInfo {
                location: vec![location(vec![8, 11]), location(vec![8, 1]), location(vec![4, 0])],
            }),
            ..Default::default()
        })
        .unwrap();
        Image::new(vec![ImageFile::builder(descriptor).build().unwrap()]).unwrap()
    }

    fn location_paths(image: &Image) -> Vec<Vec<i32>> {
        let file = image.get_file("a.proto").unwrap();
        let info = file.descriptor().proto().source_code_info.as_ref().unwrap();
        info.location.iter().map(|l| l.path.clone()).collect()
    }

    #[test]
    fn test_sweep_removes_marked_only() {
        let mut image = image();
        let mut sweeper = MarkSweeper::new(&mut image);
        sweeper.mark("a.proto", vec![8, 11]);
        sweeper.mark("missing.proto", vec![8, 1]);
        assert_eq!(sweeper.sweep().unwrap(), 1);
        assert_eq!(location_paths(&image), vec![vec![8, 1], vec![4, 0]]);
    }

    #[test]
    fn test_drop_sweeps_leftover_marks() {
        let mut image = image();
        {
            let mut sweeper = MarkSweeper::new(&mut image);
            sweeper.mark("a.proto", vec![8, 1]);
        }
        assert_eq!(location_paths(&image), vec![vec![8, 11], vec![4, 0]]);
    }
}
