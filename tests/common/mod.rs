#![allow(dead_code)]

use chatstore::prelude::*;
use std::sync::Arc;

/// Store plus the recording port its index worker delivers to.
pub struct Harness {
    pub store: ChatStore,
    pub index: Arc<RecordingIndexSync>,
}

pub async fn harness() -> Harness {
    harness_with(StoreConfig::in_memory()).await
}

pub async fn harness_with(config: StoreConfig) -> Harness {
    let index = Arc::new(RecordingIndexSync::new());
    let store = ChatStore::open(config, index.clone()).await.unwrap();
    Harness { store, index }
}

pub struct Seed {
    pub personality: Personality,
    pub language: Model,
    pub thinker: Model,
    pub diffusion: Model,
}

/// Registers a personality and one model of each commonly used kind.
pub async fn seed(store: &ChatStore) -> Seed {
    let personality = store
        .write(CreatePersonality::new("Assistant", "You are a helpful assistant."))
        .await
        .unwrap();
    let models = store
        .write(CreateModels(vec![
            ModelDescriptor::new("llama-3.2-3b", ModelKind::Language, Backend::Gguf)
                .skills(["text"])
                .resources(4 << 30, 2 << 30)
                .default_model(),
            ModelDescriptor::new("qwq-32b", ModelKind::FlexibleThinker, Backend::Mlx)
                .skills(["text", "reasoning"]),
            ModelDescriptor::new("sdxl-turbo", ModelKind::Diffusion, Backend::CoreMl)
                .skills(["image"]),
        ]))
        .await
        .unwrap();
    let mut models = models.into_iter();
    let language = models.next().unwrap();
    let thinker = models.next().unwrap();
    let diffusion = models.next().unwrap();
    Seed {
        personality,
        language,
        thinker,
        diffusion,
    }
}

pub async fn language_model(store: &ChatStore, name: &str) -> Model {
    store
        .write(CreateModel(ModelDescriptor::new(
            name,
            ModelKind::Language,
            Backend::Remote,
        )))
        .await
        .unwrap()
}

pub async fn chat(store: &ChatStore, seed: &Seed, title: &str) -> Chat {
    store
        .write(CreateChat::new(seed.personality.id, title))
        .await
        .unwrap()
}
