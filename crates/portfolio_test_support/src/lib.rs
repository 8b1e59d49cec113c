//! Fixture builders for constructing valid OCI image manifests and image indexes in tests,
//! without hand-assembling JSON strings at every call site.
use bytes::Bytes;
use derive_builder::Builder;
use oci_spec::image::{
    Descriptor, DescriptorBuilder, History, ImageConfiguration, ImageIndex, ImageIndexBuilder,
    ImageManifest, ImageManifestBuilder, MediaType,
};

use portfolio_core::OciDigest;

mod errors;
pub use errors::{Error, Result};

/// A single image layer: its raw content plus an optional history entry.
#[derive(Builder, Clone)]
#[builder(build_fn(skip))]
pub struct Layer {
    pub data: Bytes,
    pub history: Option<History>,

    #[builder(setter(skip))]
    pub descriptor: Descriptor,
}

impl LayerBuilder {
    pub fn build(self) -> Result<Layer> {
        let data = self.data.ok_or_else(|| {
            Error::LayerBuilderError("must include data to construct Layer".to_string())
        })?;
        let digest = OciDigest::from(data.as_ref());
        let descriptor = DescriptorBuilder::default()
            .media_type(MediaType::ImageLayer)
            .digest(digest.to_string())
            .size(data.len() as i64)
            .build()
            .expect("all required descriptor fields are set above");
        Ok(Layer {
            data,
            descriptor,
            history: self.history.flatten(),
        })
    }
}

/// A complete image: configuration, layers, and the [`ImageManifest`] referencing both.
#[derive(Builder, Clone)]
#[builder(build_fn(skip))]
pub struct Image {
    pub config: ImageConfiguration,
    pub layers: Vec<Layer>,

    #[builder(setter(strip_option), default)]
    artifact_type: Option<MediaType>,
    #[builder(setter(strip_option), default)]
    subject: Option<Descriptor>,

    #[builder(setter(skip))]
    pub manifest: ImageManifest,
}

impl ImageBuilder {
    pub fn build(self) -> Result<Image> {
        let config = self.config.ok_or_else(|| {
            Error::ImageBuilderError(
                "must include image configuration to construct image".to_string(),
            )
        })?;
        let config_bytes = serde_json::to_vec(&config)?;
        let config_digest = OciDigest::from(config_bytes.as_slice());
        let config_descriptor = DescriptorBuilder::default()
            .media_type(MediaType::ImageConfig)
            .digest(config_digest.to_string())
            .size(config_bytes.len() as i64)
            .build()
            .expect("all required descriptor fields are set above");

        let layers = self.layers.unwrap_or_default();
        let layer_descriptors: Vec<Descriptor> =
            layers.iter().map(|l| l.descriptor.clone()).collect();

        let artifact_type = self.artifact_type.flatten();
        let subject = self.subject.flatten();

        let mut manifest_builder = ImageManifestBuilder::default()
            .schema_version(2u32)
            .media_type(MediaType::ImageManifest)
            .layers(layer_descriptors)
            .config(config_descriptor);

        if let Some(ref artifact_type) = artifact_type {
            manifest_builder = manifest_builder.artifact_type(artifact_type.clone());
        }
        if let Some(ref subject) = subject {
            manifest_builder = manifest_builder.subject(subject.clone());
        }

        let manifest = manifest_builder
            .build()
            .expect("all required image manifest fields are set above");

        Ok(Image {
            config,
            manifest,
            layers,
            artifact_type,
            subject,
        })
    }
}

impl Image {
    /// The exact JSON bytes a client would PUT for this manifest.
    pub fn manifest_bytes(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(&self.manifest).expect("manifest always serializes"))
    }

    pub fn config_bytes(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(&self.config).expect("config always serializes"))
    }

    /// The digest of this image's serialized manifest, i.e. what `docker-content-digest` would
    /// read back as after a PUT.
    pub fn digest(&self) -> OciDigest {
        OciDigest::from(self.manifest_bytes().as_ref())
    }

    /// A descriptor referencing this image's own manifest, suitable for inclusion in an
    /// [`ImageIndex`]'s `manifests` list.
    pub fn descriptor(&self) -> Descriptor {
        let bytes = self.manifest_bytes();
        DescriptorBuilder::default()
            .media_type(MediaType::ImageManifest)
            .digest(self.digest().to_string())
            .size(bytes.len() as i64)
            .build()
            .expect("all required descriptor fields are set above")
    }
}

/// An image index referencing a set of sub-manifests.
#[derive(Builder)]
#[builder(build_fn(skip))]
pub struct Index {
    pub manifests: Vec<Image>,

    #[builder(setter(strip_option), default)]
    artifact_type: Option<MediaType>,
    #[builder(setter(strip_option), default)]
    subject: Option<Descriptor>,

    #[builder(setter(skip))]
    pub index_manifest: ImageIndex,
}

impl IndexBuilder {
    pub fn build(self) -> Result<Index> {
        let manifests = self.manifests.unwrap_or_default();
        // An index references its sub-manifests by the digest of their own serialized bytes, not
        // by their config descriptor -- the two are easy to conflate but only the former is what
        // a registry has recorded under `ManifestRef::Digest`.
        let manifest_descriptors: Vec<Descriptor> =
            manifests.iter().map(Image::descriptor).collect();

        let artifact_type = self.artifact_type.flatten();
        let subject = self.subject.flatten();

        let mut index_builder = ImageIndexBuilder::default()
            .schema_version(2u32)
            .media_type(MediaType::ImageIndex)
            .manifests(manifest_descriptors);

        if let Some(ref artifact_type) = artifact_type {
            index_builder = index_builder.artifact_type(artifact_type.clone());
        }
        if let Some(ref subject) = subject {
            index_builder = index_builder.subject(subject.clone());
        }

        let index_manifest = index_builder
            .build()
            .expect("all required image index fields are set above");

        Ok(Index {
            manifests,
            index_manifest,
            artifact_type,
            subject,
        })
    }
}

impl Index {
    pub fn index_bytes(&self) -> Bytes {
        Bytes::from(
            serde_json::to_vec(&self.index_manifest).expect("index manifest always serializes"),
        )
    }

    pub fn digest(&self) -> OciDigest {
        OciDigest::from(self.index_bytes().as_ref())
    }
}

/// A minimal valid [`ImageConfiguration`], relying on `oci-spec`'s own defaults for every field
/// the caller doesn't otherwise need to vary in a given test.
pub fn basic_config() -> ImageConfiguration {
    oci_spec::image::ImageConfigurationBuilder::default()
        .build()
        .expect("ImageConfigurationBuilder has defaults for every field")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(content: &'static str) -> Layer {
        LayerBuilder::default()
            .data(Bytes::from_static(content.as_bytes()))
            .build()
            .unwrap()
    }

    #[test]
    fn image_manifest_bytes_round_trip_digest() {
        let image = ImageBuilder::default()
            .config(basic_config())
            .layers(vec![layer("layer 1"), layer("layer 2")])
            .build()
            .unwrap();

        let bytes = image.manifest_bytes();
        let digest = image.digest();
        assert_eq!(digest, OciDigest::from(bytes.as_ref()));
    }

    #[test]
    fn index_references_sub_manifest_digests_not_config_digests() {
        let image = ImageBuilder::default()
            .config(basic_config())
            .layers(vec![layer("layer 1")])
            .build()
            .unwrap();
        let image_digest = image.digest();

        let index = IndexBuilder::default()
            .manifests(vec![image])
            .build()
            .unwrap();

        let referenced: Vec<String> = index
            .index_manifest
            .manifests()
            .iter()
            .map(|d| d.digest().to_string())
            .collect();
        assert_eq!(referenced, vec![image_digest.to_string()]);
    }
}
