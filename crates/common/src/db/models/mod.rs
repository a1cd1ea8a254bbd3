//! SeaORM entity models

mod lore_document;

pub use lore_document::{
    Entity as LoreDocumentEntity,
    Model as LoreDocumentRow,
    ActiveModel as LoreDocumentActiveModel,
    Column as LoreDocumentColumn,
};
