/*!
 * Built-in exporters rendering a finalized book to local files.
 *
 * `HtmlExporter` writes a single self-contained HTML document using the
 * tree's translated text (falling back to source text for untranslated
 * nodes). `JsonExporter` dumps the raw content tree, useful for piping the
 * result into other tooling.
 */

use async_trait::async_trait;
use log::info;
use std::path::PathBuf;

use crate::app_config::Task;
use crate::book::Book;

use super::{Exporter, RoleContext, default_role_name};

/// Turn a book title into a safe artifact filename stem
fn artifact_stem(book: &Book) -> String {
    let title = book.title_translated.as_deref().unwrap_or(&book.title);
    let stem: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() { "book".to_string() } else { stem }
}

/// Exporter producing a single HTML document per book
pub struct HtmlExporter {
    name: String,
}

impl HtmlExporter {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl Default for HtmlExporter {
    fn default() -> Self {
        Self::new(default_role_name("html"))
    }
}

#[async_trait]
impl Exporter for HtmlExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(
        &self,
        book: &Book,
        _task: &Task,
        ctx: &RoleContext,
    ) -> anyhow::Result<PathBuf> {
        let path = ctx.output_dir.join(format!("{}.html", artifact_stem(book)));
        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            book.title_translated.as_deref().unwrap_or(&book.title),
            book.to_html()
        );
        tokio::fs::create_dir_all(&ctx.output_dir).await?;
        tokio::fs::write(&path, document).await?;
        info!("{}: Exported {} to {:?}", self.name, book.title, path);
        Ok(path)
    }
}

/// Exporter dumping the raw content tree as pretty-printed JSON
pub struct JsonExporter {
    name: String,
}

impl JsonExporter {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self::new(default_role_name("json"))
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(
        &self,
        book: &Book,
        _task: &Task,
        ctx: &RoleContext,
    ) -> anyhow::Result<PathBuf> {
        let path = ctx.output_dir.join(format!("{}.json", artifact_stem(book)));
        let json = serde_json::to_string_pretty(book)?;
        tokio::fs::create_dir_all(&ctx.output_dir).await?;
        tokio::fs::write(&path, json).await?;
        info!("{}: Exported {} to {:?}", self.name, book.title, path);
        Ok(path)
    }
}
