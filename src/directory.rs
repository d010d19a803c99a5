//! Member directory adapter.
//!
//! Read-only lookup of fleet member metadata plus a tag write used to
//! cache the member's IP for deletion time. The production backend is
//! the compute platform's instance API; [`MemoryDirectory`] backs tests
//! and local dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::types::Member;

/// Lookup and tag writes against the fleet's member metadata store.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Fetch a member by identifier.
    async fn get(&self, member_id: &str) -> Result<Member, DirectoryError>;

    /// Merge the given tags into the member's tag map. Existing keys are
    /// overwritten, other keys are untouched.
    async fn set_tags(
        &self,
        member_id: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), DirectoryError>;
}

/// In-memory member directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    members: Mutex<HashMap<String, Member>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member.
    pub fn insert(&self, member: Member) {
        self.members
            .lock()
            .expect("directory mutex poisoned")
            .insert(member.id.clone(), member);
    }

    /// Remove a member, returning it if present.
    pub fn remove(&self, member_id: &str) -> Option<Member> {
        self.members
            .lock()
            .expect("directory mutex poisoned")
            .remove(member_id)
    }
}

#[async_trait]
impl MemberDirectory for MemoryDirectory {
    async fn get(&self, member_id: &str) -> Result<Member, DirectoryError> {
        self.members
            .lock()
            .expect("directory mutex poisoned")
            .get(member_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(member_id.to_string()))
    }

    async fn set_tags(
        &self,
        member_id: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), DirectoryError> {
        let mut members = self.members.lock().expect("directory mutex poisoned");
        let member = members
            .get_mut(member_id)
            .ok_or_else(|| DirectoryError::NotFound(member_id.to_string()))?;
        member.tags.extend(tags);
        Ok(())
    }
}
