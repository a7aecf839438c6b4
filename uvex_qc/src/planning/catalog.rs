//! The universe of survey field identifiers.

use crate::core::domain::FieldId;

/// Generated field catalog: numbers `1..=size`, each with a plain and,
/// optionally, an offset variant.
///
/// ```
/// use uvex_qc::planning::catalog::FieldCatalog;
///
/// let catalog = FieldCatalog::new(2, true);
/// let ids: Vec<String> = catalog.iter().map(|f| f.to_string()).collect();
/// assert_eq!(ids, vec!["0001", "0001o", "0002", "0002o"]);
/// assert_eq!(FieldCatalog::survey().len(), 15270);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCatalog {
    size: u32,
    include_offsets: bool,
}

impl FieldCatalog {
    pub const SURVEY_SIZE: u32 = 7635;

    pub fn new(size: u32, include_offsets: bool) -> Self {
        Self {
            size,
            include_offsets,
        }
    }

    /// The full survey: 7635 positions with their offset pointings.
    pub fn survey() -> Self {
        Self::new(Self::SURVEY_SIZE, true)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn include_offsets(&self) -> bool {
        self.include_offsets
    }

    /// Number of identifiers in the catalog.
    pub fn len(&self) -> usize {
        let per_number = if self.include_offsets { 2 } else { 1 };
        self.size as usize * per_number
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, field: FieldId) -> bool {
        (1..=self.size).contains(&field.number()) && (self.include_offsets || !field.is_offset())
    }

    /// Identifiers in catalog order: `0001, 0001o, 0002, ...`.
    pub fn iter(&self) -> impl Iterator<Item = FieldId> {
        let include_offsets = self.include_offsets;
        (1..=self.size).flat_map(move |n| {
            let offset = include_offsets.then(|| FieldId::offset(n));
            std::iter::once(FieldId::plain(n)).chain(offset)
        })
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::survey()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_only_catalog() {
        let catalog = FieldCatalog::new(3, false);
        let ids: Vec<FieldId> = catalog.iter().collect();

        assert_eq!(ids, vec![FieldId::plain(1), FieldId::plain(2), FieldId::plain(3)]);
        assert_eq!(catalog.len(), 3);
        assert!(!catalog.contains(FieldId::offset(1)));
        assert!(!catalog.contains(FieldId::plain(0)));
        assert!(!catalog.contains(FieldId::plain(4)));
    }

    #[test]
    fn test_survey_catalog_bounds() {
        let catalog = FieldCatalog::survey();
        assert_eq!(catalog.iter().count(), catalog.len());
        assert!(catalog.contains(FieldId::offset(7635)));
        assert!(!catalog.contains(FieldId::plain(7636)));
        assert_eq!(catalog.iter().last(), Some(FieldId::offset(7635)));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = FieldCatalog::new(0, true);
        assert!(catalog.is_empty());
        assert_eq!(catalog.iter().count(), 0);
    }
}
