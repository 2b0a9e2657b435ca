use std::sync::Arc;

use bevy_data_tags::*;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Stone,
    OakLog,
    BirchLog,
    Wool,
}

// Types must be in scope when the macro expands
required_tags! {
    /// Block tags the game logic depends on.
    pub mod BlockTags<crate::Block> in "block" {
        /// Burnable logs
        LOGS = "logs";
        WOOL = "minecraft:wool";
        MINEABLE_PICKAXE = "mymod:mineable/pickaxe";
    }
}

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

fn block_registry() -> Arc<dyn TagRegistry<Block>> {
    Arc::new(
        SimpleRegistry::from_entries([
            (id("stone"), Block::Stone),
            (id("oak_log"), Block::OakLog),
            (id("birch_log"), Block::BirchLog),
            (id("white_wool"), Block::Wool),
        ])
        .unwrap(),
    )
}

#[test]
fn constants_are_normalized() {
    assert_eq!(BlockTags::REGISTRY, "minecraft:block");
    assert_eq!(BlockTags::LOGS, "minecraft:logs");
    assert_eq!(BlockTags::WOOL, "minecraft:wool");
    assert_eq!(BlockTags::MINEABLE_PICKAXE, "mymod:mineable/pickaxe");
    assert_eq!(BlockTags::IDS.len(), 3);
}

#[test]
fn register_declares_every_id() {
    let required = RequiredTags::new();
    let handles = BlockTags::register(&required).unwrap();

    let key = RegistryKey::parse(BlockTags::REGISTRY).unwrap();
    let list = required.register::<Block>(key).unwrap();
    assert_eq!(
        list.ids(),
        vec![id("logs"), id("wool"), id("mymod:mineable/pickaxe")]
    );
    assert_eq!(handles.logs.id(), &id("logs"));
    assert!(!handles.mineable_pickaxe.is_bound());

    // Registering twice hands out the same handles.
    let again = BlockTags::register(&required).unwrap();
    assert!(Arc::ptr_eq(&handles.wool, &again.wool));
}

#[test]
fn register_rejects_other_object_type() {
    let required = RequiredTags::new();
    required
        .register::<u32>(RegistryKey::parse("block").unwrap())
        .unwrap();
    assert!(matches!(
        BlockTags::register(&required),
        Err(RequiredTagsError::TypeMismatch(_))
    ));
}

#[test]
fn handles_follow_reloads() {
    let service = TagService::new();
    let handles = BlockTags::register(service.required()).unwrap();

    let mut reloader = TagReloader::new(TagsConfig::default());
    reloader.add_domain(RegistryKey::parse(BlockTags::REGISTRY).unwrap(), block_registry());

    let mut packs = MemoryDataPacks::new();
    packs
        .push_pack("vanilla")
        .insert("tags/blocks", id("logs"), json!({"values": ["oak_log", "birch_log"]}).to_string())
        .insert("tags/blocks", id("wool"), json!({"values": ["white_wool"]}).to_string())
        .insert(
            "tags/blocks",
            id("mymod:mineable/pickaxe"),
            json!({"values": ["stone"]}).to_string(),
        );
    reloader.reload(&service, &packs).unwrap();

    assert_eq!(handles.logs.values(), [Block::OakLog, Block::BirchLog]);
    assert!(handles.wool.contains(&Block::Wool));
    assert!(handles.mineable_pickaxe.contains(&Block::Stone));

    // A data pack narrows logs down to oak only.
    packs
        .push_pack("mymod")
        .insert("tags/blocks", id("logs"), json!({"replace": true, "values": ["oak_log"]}).to_string());
    reloader.reload(&service, &packs).unwrap();

    assert_eq!(handles.logs.values(), [Block::OakLog]);
    assert_eq!(service.generation(), 2);
}

#[test]
fn reload_missing_a_declared_tag_is_rejected() {
    let service = TagService::new();
    let handles = BlockTags::register(service.required()).unwrap();

    let mut reloader = TagReloader::new(TagsConfig::default());
    reloader.add_domain(RegistryKey::parse("block").unwrap(), block_registry());

    let mut packs = MemoryDataPacks::new();
    packs.insert("tags/blocks", id("logs"), json!({"values": ["oak_log"]}).to_string());

    let err = reloader.reload(&service, &packs).unwrap_err();
    let ReloadError::MissingRequiredTags { missing } = err else {
        panic!("expected missing required tags");
    };
    let missing = &missing[&RegistryKey::parse("block").unwrap()];
    assert!(missing.contains(&id("wool")));
    assert!(missing.contains(&id("mymod:mineable/pickaxe")));
    assert!(!handles.logs.is_bound());
}
