//! Blog schema shared by the unit tests.

use std::sync::Arc;

use crate::schema::{Association, EntityMetadata, FieldType, InMemorySchema, JoinTable};

pub(crate) fn blog() -> InMemorySchema {
    InMemorySchema::new()
        .with_entity(
            EntityMetadata::new("Post", "posts")
                .with_identifier("id")
                .with_field("title", FieldType::String)
                .with_field("body", FieldType::Text)
                .with_field("views", FieldType::Integer)
                .with_field("rating", FieldType::Decimal)
                .with_field("published", FieldType::Boolean)
                .with_field("status", FieldType::SmallInt)
                .with_column("createdAt", "created_at", FieldType::DateTime)
                .with_association("author", Association::many_to_one("User", "author_id"))
                .with_association("group", Association::many_to_one("Group", "group_id"))
                .with_association("comments", Association::one_to_many("Comment", "post_id"))
                .with_association(
                    "categories",
                    Association::many_to_many(
                        "Category",
                        JoinTable {
                            table: "post_categories".into(),
                            source_column: "post_id".into(),
                            target_column: "category_id".into(),
                        },
                    ),
                ),
        )
        .with_entity(
            EntityMetadata::new("User", "users")
                .with_identifier("id")
                .with_field("name", FieldType::String)
                .with_field("username", FieldType::String)
                .with_association("address", Association::one_to_one("Address", "address_id")),
        )
        .with_entity(
            EntityMetadata::new("Address", "addresses")
                .with_identifier("id")
                .with_field("city", FieldType::String)
                .with_field("street", FieldType::String),
        )
        .with_entity(
            EntityMetadata::new("Comment", "comments")
                .with_identifier("id")
                .with_field("body", FieldType::Text)
                .with_column("createdAt", "created_at", FieldType::DateTime)
                .with_association("createdBy", Association::many_to_one("User", "created_by_id")),
        )
        .with_entity(
            EntityMetadata::new("Category", "categories")
                .with_identifier("id")
                .with_field("name", FieldType::String),
        )
        .with_entity(
            EntityMetadata::new("Group", "user_groups")
                .with_identifier("id")
                .with_field("name", FieldType::String),
        )
}

pub(crate) fn blog_schema() -> Arc<dyn crate::schema::SchemaProvider> {
    Arc::new(blog())
}
