//! Augmentation registry: the factory-style construction path.

use std::collections::BTreeMap;

use super::color::{
    Brightness, Contrast, GaussianBlur, GaussianNoise, Grayscale, JpegCompression, SaltAndPepper,
};
use super::geometric::{
    HorizontalFlip, RandomCrop, Resize, Rotate, Scale, Shear, Translate, VerticalFlip,
};
use super::{Augmentation, AugmentationError, AugmentationKind, Options, TypedAugmentation};

type Constructor = fn(&Options) -> Result<Box<dyn Augmentation>, AugmentationError>;

fn construct<T: TypedAugmentation>(
    options: &Options,
) -> Result<Box<dyn Augmentation>, AugmentationError> {
    Ok(Box::new(T::from_options(options)?))
}

/// A registered augmentation: its name, kind and constructor.
#[derive(Clone, Copy)]
pub struct AugmentationEntry {
    pub name: &'static str,
    pub kind: AugmentationKind,
    constructor: Constructor,
}

impl AugmentationEntry {
    /// Entry for a statically typed augmentation.
    pub fn of<T: TypedAugmentation>() -> Self {
        Self {
            name: T::NAME,
            kind: T::KIND,
            constructor: construct::<T>,
        }
    }

    /// Instantiate with keyword options.
    pub fn create(&self, options: &Options) -> Result<Box<dyn Augmentation>, AugmentationError> {
        (self.constructor)(options)
    }
}

impl std::fmt::Debug for AugmentationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentationEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registry of available augmentations, keyed by name.
///
/// All built-in augmentations are registered automatically on creation.
/// Iteration order is sorted by name so runs are reproducible.
#[derive(Debug)]
pub struct AugmentationRegistry {
    entries: BTreeMap<&'static str, AugmentationEntry>,
}

impl AugmentationRegistry {
    /// Create a new registry with all built-in augmentations registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Color-only
        registry.register(AugmentationEntry::of::<Grayscale>());
        registry.register(AugmentationEntry::of::<Brightness>());
        registry.register(AugmentationEntry::of::<Contrast>());
        registry.register(AugmentationEntry::of::<GaussianNoise>());
        registry.register(AugmentationEntry::of::<SaltAndPepper>());
        registry.register(AugmentationEntry::of::<GaussianBlur>());
        registry.register(AugmentationEntry::of::<JpegCompression>());

        // Geometric
        registry.register(AugmentationEntry::of::<HorizontalFlip>());
        registry.register(AugmentationEntry::of::<VerticalFlip>());
        registry.register(AugmentationEntry::of::<Rotate>());
        registry.register(AugmentationEntry::of::<Scale>());
        registry.register(AugmentationEntry::of::<Shear>());
        registry.register(AugmentationEntry::of::<Translate>());
        registry.register(AugmentationEntry::of::<RandomCrop>());
        registry.register(AugmentationEntry::of::<Resize>());

        registry
    }

    /// Create a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register an augmentation, replacing any entry with the same name.
    pub fn register(&mut self, entry: AugmentationEntry) {
        self.entries.insert(entry.name, entry);
    }

    /// Get an entry by name.
    pub fn get(&self, name: &str) -> Option<&AugmentationEntry> {
        self.entries.get(name)
    }

    /// Resolve `name` and instantiate it with keyword options.
    pub fn create(
        &self,
        name: &str,
        options: &Options,
    ) -> Result<Box<dyn Augmentation>, AugmentationError> {
        let entry = self
            .get(name)
            .ok_or_else(|| AugmentationError::unknown(name))?;
        entry.create(options)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// All entries, sorted by name.
    pub fn all(&self) -> impl Iterator<Item = &AugmentationEntry> {
        self.entries.values()
    }

    /// Names of the color-only augmentations.
    pub fn color_only(&self) -> Vec<&'static str> {
        self.all()
            .filter(|e| e.kind.is_color_only())
            .map(|e| e.name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AugmentationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
