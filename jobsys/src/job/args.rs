use std::ops::Range;

/// The contiguous, half-open slice of job indices a single group covers.
///
/// Groups of one dispatch partition `[0, job_count)` exactly: every index
/// belongs to exactly one group and the last group may be shorter than the
/// requested group size, but never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupRange {
    pub group_id: u32,
    pub offset: u32,
    pub end: u32,
}

impl GroupRange {
    pub fn len(&self) -> u32 {
        self.end - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.end
    }

    pub fn indices(&self) -> Range<u32> {
        self.offset..self.end
    }
}

/// Arguments handed to a task, once per job index.
///
/// Indices of one group are processed in increasing order on one thread, so
/// `is_first_job_in_group` and `is_last_job_in_group` can bracket group-scoped
/// setup and accumulation, typically in `shared_memory`.
#[derive(Debug)]
pub struct JobArgs<'a> {
    /// Absolute index in `[0, job_count)`.
    pub job_index: u32,

    /// Ordinal of the group within its dispatch.
    pub group_id: u32,

    /// Index relative to the start of the group.
    pub group_index: u32,

    pub is_first_job_in_group: bool,

    pub is_last_job_in_group: bool,

    /// Scratch memory shared by every index of the group, `None` unless the
    /// dispatch requested some. Exactly the requested number of bytes; the
    /// content is whatever the previous user of the buffer left in it.
    pub shared_memory: Option<&'a mut [u8]>,
}

impl<'a> JobArgs<'a> {
    #[inline]
    pub(crate) fn new(job_index: u32, group: &GroupRange, shared_memory: Option<&'a mut [u8]>) -> Self {
        debug_assert!(group.indices().contains(&job_index));

        Self {
            job_index,
            group_id: group.group_id,
            group_index: job_index - group.offset,
            is_first_job_in_group: job_index == group.offset,
            is_last_job_in_group: job_index == group.end - 1,
            shared_memory,
        }
    }
}
