//! BookStack tool catalog.
//!
//! Read tools (list/get/search) and write tools (create/delete) are built as two separate sets
//! so a deployment can serve the read surface alone.

use super::registry::{RegistryError, ToolDefinition, ToolRegistry};
use super::{BoundArgs, ParamDescriptor, ParamKind, ToolError};
use bookstack_api::{DocumentApi, EntityKind, Filter, FilterOperator, ListParams};
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub type SharedApi = Arc<dyn DocumentApi>;

/// Build the served registry: read tools, plus write tools when `expose_write_tools` is set.
///
/// # Errors
///
/// Returns an error if the catalog contains duplicate tool names.
pub fn catalog(api: &SharedApi, expose_write_tools: bool) -> Result<ToolRegistry, RegistryError> {
    let mut builder = ToolRegistry::builder().tools(read_tools(api));
    if expose_write_tools {
        builder = builder.tools(write_tools(api));
    }
    builder.build()
}

#[must_use]
pub fn read_tools(api: &SharedApi) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    for kind in EntityKind::ALL {
        tools.push(list_tool(api, kind));
        tools.push(get_tool(api, kind));
    }
    tools.push(search_all_tool(api));
    for kind in EntityKind::ALL {
        tools.push(search_tool(api, kind));
    }
    tools.push(advanced_search_tool(api));
    tools
}

#[must_use]
pub fn write_tools(api: &SharedApi) -> Vec<ToolDefinition> {
    vec![
        create_book_tool(api),
        delete_tool(api, EntityKind::Book),
        create_chapter_tool(api),
        delete_tool(api, EntityKind::Chapter),
        create_page_tool(api),
        delete_tool(api, EntityKind::Page),
        create_shelf_tool(api),
        delete_tool(api, EntityKind::Shelf),
    ]
}

fn offset_param() -> ParamDescriptor {
    ParamDescriptor::with_default("offset", 0).describe("Number of records to skip")
}

fn count_param() -> ParamDescriptor {
    ParamDescriptor::with_default("count", 50).describe("Maximum number of records to return")
}

fn id_param(kind: EntityKind) -> ParamDescriptor {
    ParamDescriptor::required("id", ParamKind::Integer).describe(format!("ID of the {kind}"))
}

fn page_of(args: &BoundArgs) -> ListParams {
    ListParams::page(
        args.opt_int("offset").unwrap_or(0),
        args.opt_int("count").unwrap_or(50),
    )
}

fn list_tool(api: &SharedApi, kind: EntityKind) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        format!("list_{}", kind.collection()),
        format!("List all {}", kind.collection()),
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move { Ok(api.list(kind, &page_of(&args)).await?) }
        },
    )
    .param(offset_param())
    .param(count_param())
}

fn get_tool(api: &SharedApi, kind: EntityKind) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        format!("get_{}", kind.singular()),
        format!("Get {kind} details by ID"),
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move { Ok(api.read(kind, args.int("id")?).await?) }
        },
    )
    .param(id_param(kind))
}

fn search_description(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Book => "Search for books by name or description",
        EntityKind::Chapter => "Search for chapters by name or description",
        EntityKind::Page => "Search for pages by name or content",
        EntityKind::Shelf => "Search for shelves by name or description",
        EntityKind::User => "Search for users by name or email",
    }
}

fn query_param() -> ParamDescriptor {
    ParamDescriptor::required("query", ParamKind::String).describe("Text to match against names")
}

async fn search(
    api: &dyn DocumentApi,
    kind: EntityKind,
    args: &BoundArgs,
) -> Result<Value, ToolError> {
    let params = page_of(args).with_filter(Filter::name_like(args.str("query")?));
    Ok(api.list(kind, &params).await?)
}

fn search_tool(api: &SharedApi, kind: EntityKind) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        format!("search_{}", kind.collection()),
        search_description(kind),
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move { search(api.as_ref(), kind, &args).await }
        },
    )
    .param(query_param())
    .param(offset_param())
    .param(count_param())
}

fn search_all_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        "search_all",
        "Search across all BookStack content (books, chapters, pages)",
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move {
                let (books, chapters, pages) = futures::try_join!(
                    search(api.as_ref(), EntityKind::Book, &args),
                    search(api.as_ref(), EntityKind::Chapter, &args),
                    search(api.as_ref(), EntityKind::Page, &args),
                )?;
                Ok(json!({
                    "query": args.str("query")?,
                    "books": books,
                    "chapters": chapters,
                    "pages": pages,
                }))
            }
        },
    )
    .param(query_param())
    .param(offset_param())
    .param(count_param())
}

fn advanced_search_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        "advanced_search",
        "Advanced search with custom filters",
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move {
                let raw_kind = args.str("entityType")?;
                let kind: EntityKind = raw_kind.parse().map_err(|_| {
                    let supported: Vec<_> = EntityKind::ALL.iter().map(|k| k.singular()).collect();
                    ToolError::invalid(
                        "entityType",
                        format!(
                            "Unsupported entity type '{raw_kind}'. Supported types: {}",
                            supported.join(", ")
                        ),
                    )
                })?;
                let operator =
                    FilterOperator::parse_lenient(args.opt_str("operatorType").unwrap_or("like"));
                let params = page_of(&args).with_filter(Filter::new(
                    args.str("field")?,
                    operator,
                    args.str("value")?,
                ));
                Ok(api.list(kind, &params).await?)
            }
        },
    )
    .param(
        ParamDescriptor::required("entityType", ParamKind::String)
            .describe("One of: book, chapter, page, shelf, user"),
    )
    .param(ParamDescriptor::required("field", ParamKind::String).describe("Field to filter on"))
    .param(ParamDescriptor::required("value", ParamKind::String).describe("Filter value"))
    .param(
        ParamDescriptor::with_default("operatorType", "like")
            .describe("One of: eq, ne, gt, lt, gte, lte, like"),
    )
    .param(offset_param())
    .param(count_param())
}

async fn create_entity(
    api: &dyn DocumentApi,
    kind: EntityKind,
    body: Map<String, Value>,
) -> Result<Value, ToolError> {
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    tracing::info!(kind = %kind, name = %name, "creating {kind}");
    match api.create(kind, Value::Object(body)).await {
        Ok(created) => {
            let id = created.get("id").cloned().unwrap_or(Value::Null);
            tracing::info!(kind = %kind, id = %id, "{kind} created");
            Ok(created)
        }
        Err(e) => {
            tracing::error!(kind = %kind, name = %name, error = %e, "failed to create {kind}");
            Err(e.into())
        }
    }
}

fn insert_opt(body: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(v) = value {
        body.insert(key.to_string(), v);
    }
}

fn create_book_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new("create_book", "Create a new book", move |args: BoundArgs| {
        let api = Arc::clone(&api);
        async move {
            let mut body = Map::new();
            body.insert("name".to_string(), json!(args.str("name")?));
            insert_opt(&mut body, "description", args.opt_str("description").map(|d| json!(d)));
            create_entity(api.as_ref(), EntityKind::Book, body).await
        }
    })
    .param(ParamDescriptor::required("name", ParamKind::String).describe("Book name"))
    .param(ParamDescriptor::optional("description", ParamKind::String).describe("Book description"))
    .failure_label("Failed to create book")
    .error_context("name", "bookName")
}

fn create_chapter_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new("create_chapter", "Create a new chapter", move |args: BoundArgs| {
        let api = Arc::clone(&api);
        async move {
            let mut body = Map::new();
            body.insert("book_id".to_string(), json!(args.int("bookId")?));
            body.insert("name".to_string(), json!(args.str("name")?));
            insert_opt(&mut body, "description", args.opt_str("description").map(|d| json!(d)));
            body.insert("priority".to_string(), json!(args.opt_int("priority").unwrap_or(0)));
            create_entity(api.as_ref(), EntityKind::Chapter, body).await
        }
    })
    .param(ParamDescriptor::required("name", ParamKind::String).describe("Chapter name"))
    .param(
        ParamDescriptor::required("bookId", ParamKind::Integer)
            .describe("ID of the parent book"),
    )
    .param(
        ParamDescriptor::optional("description", ParamKind::String)
            .describe("Chapter description"),
    )
    .param(ParamDescriptor::with_default("priority", 0).describe("Sort position within the book"))
    .failure_label("Failed to create chapter")
    .error_context("name", "chapterName")
    .error_context("bookId", "bookId")
}

fn create_page_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new("create_page", "Create a new page", move |args: BoundArgs| {
        let api = Arc::clone(&api);
        async move {
            let book_id = args.opt_int("bookId");
            let chapter_id = args.opt_int("chapterId");
            if book_id.is_none() && chapter_id.is_none() {
                return Err(ToolError::invalid(
                    "bookId",
                    "Either 'bookId' or 'chapterId' must be provided",
                ));
            }
            let mut body = Map::new();
            body.insert("name".to_string(), json!(args.str("name")?));
            body.insert("html".to_string(), json!(args.str("content")?));
            insert_opt(&mut body, "book_id", book_id.map(|id| json!(id)));
            insert_opt(&mut body, "chapter_id", chapter_id.map(|id| json!(id)));
            create_entity(api.as_ref(), EntityKind::Page, body).await
        }
    })
    .param(ParamDescriptor::required("name", ParamKind::String).describe("Page name"))
    .param(ParamDescriptor::required("content", ParamKind::String).describe("Page content as HTML"))
    .param(
        ParamDescriptor::optional("bookId", ParamKind::Integer)
            .describe("ID of the parent book"),
    )
    .param(
        ParamDescriptor::optional("chapterId", ParamKind::Integer)
            .describe("ID of the parent chapter"),
    )
    .failure_label("Failed to create page")
    .error_context("name", "pageName")
    .error_context("bookId", "bookId")
    .error_context("chapterId", "chapterId")
}

fn create_shelf_tool(api: &SharedApi) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new("create_shelf", "Create a new shelf", move |args: BoundArgs| {
        let api = Arc::clone(&api);
        async move {
            let mut body = Map::new();
            body.insert("name".to_string(), json!(args.str("name")?));
            insert_opt(&mut body, "description", args.opt_str("description").map(|d| json!(d)));
            create_entity(api.as_ref(), EntityKind::Shelf, body).await
        }
    })
    .param(ParamDescriptor::required("name", ParamKind::String).describe("Shelf name"))
    .param(
        ParamDescriptor::optional("description", ParamKind::String)
            .describe("Shelf description"),
    )
    .failure_label("Failed to create shelf")
    .error_context("name", "shelfName")
}

fn delete_tool(api: &SharedApi, kind: EntityKind) -> ToolDefinition {
    let api = Arc::clone(api);
    ToolDefinition::new(
        format!("delete_{}", kind.singular()),
        format!("Delete a {kind}"),
        move |args: BoundArgs| {
            let api = Arc::clone(&api);
            async move {
                let id = args.int("id")?;
                tracing::info!(kind = %kind, id, "deleting {kind}");
                if let Err(e) = api.delete(kind, id).await {
                    tracing::error!(kind = %kind, id, error = %e, "failed to delete {kind}");
                    return Err(e.into());
                }
                tracing::info!(kind = %kind, id, "{kind} deleted");
                Ok(json!({ "success": true }))
            }
        },
    )
    .param(id_param(kind))
    .failure_label(format!("Failed to delete {kind}"))
    .error_context("id", format!("{}Id", kind.singular()))
}
