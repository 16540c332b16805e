//! The sorted export collection.

use std::fmt;

use bitflags::bitflags;

use crate::error::{Error, Result};

/// What an export record describes.
///
/// The declaration order is the output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExportKind {
    /// An allowed client (`LC_SUB_CLIENT`)
    Client,
    /// A re-exported library (`LC_REEXPORT_DYLIB`)
    Reexport,
    /// A plain symbol
    NormalSymbol,
    /// An ObjC class (prefix stripped)
    ObjcClassSymbol,
    /// An ObjC instance variable (prefix stripped)
    ObjcIvarSymbol,
    /// A weak definition
    WeakDefSymbol,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportKind::Client => "allowable-clients",
            ExportKind::Reexport => "re-exports",
            ExportKind::NormalSymbol => "symbols",
            ExportKind::ObjcClassSymbol => "objc-classes",
            ExportKind::ObjcIvarSymbol => "objc-ivars",
            ExportKind::WeakDefSymbol => "weak-def-symbols",
        })
    }
}

bitflags! {
    /// Writer hints attached to an export.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExportFlags: u8 {
        /// The string must be quoted when written
        const NEEDS_QUOTES = 1 << 0;
    }
}

impl ExportFlags {
    /// Computes the flags for a string.
    pub fn for_string(string: &str) -> Self {
        if needs_quotes(string) {
            ExportFlags::NEEDS_QUOTES
        } else {
            ExportFlags::empty()
        }
    }
}

fn needs_quotes(string: &str) -> bool {
    const SPECIAL: &[char] = &[
        ':', '{', '}', '[', ']', ',', '&', '*', '#', '?', '|', '<', '>', '=', '!', '%', '@', '`',
        '"', '\'', '\n', '\t',
    ];

    let starts_or_ends_blank = string.starts_with(char::is_whitespace)
        || string.ends_with(char::is_whitespace);

    string.is_empty() || starts_or_ends_blank || string.starts_with('-') || string.contains(SPECIAL)
}

/// One entry in the `exports` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInfo {
    /// Arch bits of every slice that exports this entry
    pub archs: u64,
    /// Kind of entry
    pub kind: ExportKind,
    /// Symbol name, client name or library path
    pub string: String,
    /// Writer hints
    pub flags: ExportFlags,
}

impl ExportInfo {
    /// Creates a record for a single set of arch bits.
    pub fn new(archs: u64, kind: ExportKind, string: &str) -> Self {
        Self {
            archs,
            kind,
            string: string.to_owned(),
            flags: ExportFlags::for_string(string),
        }
    }
}

/// Exports kept sorted by `(kind, string)`, unique on that key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exports {
    items: Vec<ExportInfo>,
}

impl Exports {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, kind: ExportKind, string: &str) -> std::result::Result<usize, usize> {
        self.items
            .binary_search_by(|item| (item.kind, item.string.as_str()).cmp(&(kind, string)))
    }

    /// Adds `string` for the given arch bits, merging into an existing record.
    ///
    /// # Errors
    ///
    /// [`Error::ArrayFail`] if the collection cannot grow.
    pub fn insert(&mut self, archs: u64, kind: ExportKind, string: &str) -> Result<()> {
        match self.search(kind, string) {
            Ok(index) => self.items[index].archs |= archs,
            Err(index) => {
                self.items.try_reserve(1).map_err(|_| Error::ArrayFail)?;
                self.items.insert(index, ExportInfo::new(archs, kind, string));
            }
        }
        Ok(())
    }

    /// Looks up a record.
    pub fn get(&self, kind: ExportKind, string: &str) -> Option<&ExportInfo> {
        self.search(kind, string).ok().map(|index| &self.items[index])
    }

    /// Iterates the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ExportInfo> {
        self.items.iter()
    }

    /// Iterates the records of one kind.
    pub fn of_kind(&self, kind: ExportKind) -> impl Iterator<Item = &ExportInfo> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Exports {
    type Item = &'a ExportInfo;
    type IntoIter = std::slice::Iter<'a, ExportInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(exports: &Exports) -> Vec<(ExportKind, &str, u64)> {
        exports
            .iter()
            .map(|e| (e.kind, e.string.as_str(), e.archs))
            .collect()
    }

    #[test]
    fn test_dedup_ors_archs() {
        let mut exports = Exports::new();
        exports.insert(1 << 24, ExportKind::NormalSymbol, "_shared").unwrap();
        exports.insert(1 << 54, ExportKind::NormalSymbol, "_shared").unwrap();

        assert_eq!(exports.len(), 1);
        assert_eq!(
            exports.get(ExportKind::NormalSymbol, "_shared").unwrap().archs,
            (1 << 24) | (1 << 54)
        );
    }

    #[test]
    fn test_same_string_different_kind() {
        let mut exports = Exports::new();
        exports.insert(1, ExportKind::NormalSymbol, "_Foo").unwrap();
        exports.insert(1, ExportKind::ObjcClassSymbol, "_Foo").unwrap();
        assert_eq!(exports.len(), 2);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let entries = [
            (1u64, ExportKind::WeakDefSymbol, "_w"),
            (2, ExportKind::NormalSymbol, "_b"),
            (4, ExportKind::Reexport, "/usr/lib/libz.dylib"),
            (1, ExportKind::NormalSymbol, "_a"),
            (8, ExportKind::NormalSymbol, "_b"),
            (2, ExportKind::Client, "Foo"),
        ];

        let mut forward = Exports::new();
        for (archs, kind, string) in entries {
            forward.insert(archs, kind, string).unwrap();
        }

        let mut backward = Exports::new();
        for (archs, kind, string) in entries.iter().rev() {
            backward.insert(*archs, *kind, string).unwrap();
        }

        assert_eq!(forward, backward);
        assert_eq!(
            keys(&forward),
            vec![
                (ExportKind::Client, "Foo", 2),
                (ExportKind::Reexport, "/usr/lib/libz.dylib", 4),
                (ExportKind::NormalSymbol, "_a", 1),
                (ExportKind::NormalSymbol, "_b", 10),
                (ExportKind::WeakDefSymbol, "_w", 1),
            ]
        );
    }

    #[test]
    fn test_needs_quotes() {
        assert_eq!(ExportFlags::for_string("_foo"), ExportFlags::empty());
        assert_eq!(ExportFlags::for_string("_foo:bar"), ExportFlags::NEEDS_QUOTES);
        assert_eq!(ExportFlags::for_string(" _foo"), ExportFlags::NEEDS_QUOTES);
        assert_eq!(ExportFlags::for_string(""), ExportFlags::NEEDS_QUOTES);
    }
}
