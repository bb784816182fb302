//! Per-item filtering applied by the page source before yielding

use std::fmt;
use std::sync::Arc;

use glob::Pattern;

use crate::error::ConfigError;
use crate::resource::Resource;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Accepts or rejects listed items. Rejected items are skipped silently.
///
/// Combines an optional glob on the display name with an optional predicate;
/// an item must pass both.
pub struct ItemFilter<T> {
    name: Option<Pattern>,
    predicate: Option<Predicate<T>>,
}

impl<T> Clone for ItemFilter<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> fmt::Debug for ItemFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFilter")
            .field("name", &self.name.as_ref().map(Pattern::as_str))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl<T> Default for ItemFilter<T> {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl<T> ItemFilter<T> {
    pub fn accept_all() -> Self {
        Self {
            name: None,
            predicate: None,
        }
    }

    /// Require the display name to match a glob (`*`, `?`, `[...]`)
    pub fn name_glob(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let compiled = Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.msg.to_string(),
        })?;
        self.name = Some(compiled);
        Ok(self)
    }

    pub fn predicate(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn is_accept_all(&self) -> bool {
        self.name.is_none() && self.predicate.is_none()
    }
}

impl<T: Resource> ItemFilter<T> {
    pub fn matches(&self, item: &T) -> bool {
        if let Some(pattern) = &self.name {
            if !pattern.matches(item.display_name()) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(item))
    }
}
