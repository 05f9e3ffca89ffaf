//! Named-method access to the augmentation catalogue.
//!
//! [`Facade`] is the second construction path next to
//! [`AugmentationRegistry`](crate::augmentations::AugmentationRegistry): one
//! method per augmentation plus [`Facade::by_name`]. It builds each
//! augmentation directly from its type rather than through the registry, and
//! the returned [`BoundAugmentation`] works on annotations instead of the raw
//! annotation array.

use image::RgbImage;
use rand::rngs::StdRng;

use crate::annotation::{Annotation, annotations_from_array, annotations_to_array};
use crate::augmentations::{
    Augmentation, AugmentationError, AugmentationKind, Brightness, Contrast, GaussianBlur,
    GaussianNoise, Grayscale, HorizontalFlip, JpegCompression, Options, RandomCrop, Resize,
    Rotate, SaltAndPepper, Scale, Shear, Translate, TypedAugmentation, VerticalFlip, seeded_rng,
};

/// An augmentation applied to `(image, annotations)`.
pub struct BoundAugmentation {
    inner: Box<dyn Augmentation>,
}

impl std::fmt::Debug for BoundAugmentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAugmentation")
            .field("name", &self.inner.name())
            .field("kind", &self.inner.kind())
            .finish()
    }
}

impl BoundAugmentation {
    fn new<T: TypedAugmentation>(options: &Options) -> Result<Self, AugmentationError> {
        Ok(Self {
            inner: Box::new(T::from_options(options)?),
        })
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn kind(&self) -> AugmentationKind {
        self.inner.kind()
    }

    /// Augment a copy of `image` and `annotations`.
    pub fn apply(
        &self,
        rng: &mut StdRng,
        image: &RgbImage,
        annotations: &[Annotation],
    ) -> Result<(RgbImage, Vec<Annotation>), AugmentationError> {
        let boxes = annotations_to_array(annotations);
        let (image, boxes) = self.inner.augment(rng, image.clone(), boxes)?;
        let annotations = annotations_from_array(boxes.view())?;
        Ok((image, annotations))
    }

    /// [`apply`](Self::apply) with a generator freshly seeded from `seed`.
    pub fn apply_seeded(
        &self,
        seed: u64,
        image: &RgbImage,
        annotations: &[Annotation],
    ) -> Result<(RgbImage, Vec<Annotation>), AugmentationError> {
        self.apply(&mut seeded_rng(seed), image, annotations)
    }
}

macro_rules! facade_methods {
    ($($method:ident => $ty:ty),+ $(,)?) => {
        impl Facade {
            $(
                #[doc = concat!("Build [`", stringify!($ty), "`] from keyword options.")]
                pub fn $method(&self, options: &Options) -> Result<BoundAugmentation, AugmentationError> {
                    BoundAugmentation::new::<$ty>(options)
                }
            )+

            /// Build the augmentation called `name`.
            pub fn by_name(&self, name: &str, options: &Options) -> Result<BoundAugmentation, AugmentationError> {
                $(
                    if name == <$ty as TypedAugmentation>::NAME {
                        return self.$method(options);
                    }
                )+
                Err(AugmentationError::unknown(name))
            }

            /// Every name [`by_name`](Self::by_name) accepts, sorted.
            pub fn names(&self) -> Vec<&'static str> {
                let mut names = vec![$(<$ty as TypedAugmentation>::NAME),+];
                names.sort_unstable();
                names
            }
        }
    };
}

/// Method-per-augmentation constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Facade;

impl Facade {
    pub fn new() -> Self {
        Self
    }
}

facade_methods! {
    grayscale => Grayscale,
    brightness => Brightness,
    contrast => Contrast,
    gaussian_noise => GaussianNoise,
    salt_and_pepper => SaltAndPepper,
    gaussian_blur => GaussianBlur,
    jpeg_compression => JpegCompression,
    horizontal_flip => HorizontalFlip,
    vertical_flip => VerticalFlip,
    rotate => Rotate,
    scale => Scale,
    shear => Shear,
    translate => Translate,
    random_crop => RandomCrop,
    resize => Resize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmentations::AugmentationRegistry;
    use crate::sample::Sample;

    #[test]
    fn test_names_match_registry() {
        assert_eq!(Facade::new().names(), AugmentationRegistry::new().names());
    }

    #[test]
    fn test_by_name_unknown() {
        let err = Facade::new().by_name("Sharpen", &Options::new()).unwrap_err();
        assert!(matches!(err, AugmentationError::UnknownAugmentation(ref n) if n == "Sharpen"));
    }

    #[test]
    fn test_method_and_by_name_agree() {
        let facade = Facade::new();
        let sample = Sample::generate();
        let direct = facade
            .rotate(&Options::new())
            .unwrap()
            .apply_seeded(1, &sample.image, &sample.annotations)
            .unwrap();
        let named = facade
            .by_name("Rotate", &Options::new())
            .unwrap()
            .apply_seeded(1, &sample.image, &sample.annotations)
            .unwrap();
        assert_eq!(direct, named);
    }

    #[test]
    fn test_matches_registry_output() {
        let registry = AugmentationRegistry::new();
        let facade = Facade::new();
        let sample = Sample::generate();

        for name in registry.names() {
            let factory = registry.create(name, &Options::new()).unwrap();
            let (image, boxes) = factory
                .augment(
                    &mut seeded_rng(1),
                    sample.image.clone(),
                    annotations_to_array(&sample.annotations),
                )
                .unwrap();

            let bound = facade.by_name(name, &Options::new()).unwrap();
            let (facade_image, facade_annotations) = bound
                .apply_seeded(1, &sample.image, &sample.annotations)
                .unwrap();

            assert_eq!(image, facade_image, "{}", name);
            assert_eq!(
                annotations_from_array(boxes.view()).unwrap(),
                facade_annotations,
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_apply_leaves_input_untouched() {
        let sample = Sample::generate();
        let before = sample.clone();
        Facade::new()
            .horizontal_flip(&Options::new())
            .unwrap()
            .apply_seeded(1, &sample.image, &sample.annotations)
            .unwrap();
        assert_eq!(sample, before);
    }
}
