//! Embedded HTML templates for the file-manager page.

use minijinja::Environment;
use rust_embed::RustEmbed;

use crate::errors::{Error, Result};

#[derive(RustEmbed)]
#[folder = "templates/"]
pub struct Templates;

/// Full page shell
pub const INDEX: &str = "finder.html";
/// Fragment for pages that load the file manager in place
pub const INDEX_PARTIAL: &str = "finder-partial.html";

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(|name| match Templates::get(name) {
        Some(file) => String::from_utf8(file.data.into_owned()).map(Some).map_err(|e| {
            minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("template {name} is not UTF-8: {e}"),
            )
        }),
        None => Ok(None),
    });
    env
}

pub fn render(name: &str, context: minijinja::Value) -> Result<String> {
    let env = environment();
    let template = env.get_template(name).map_err(|e| Error::Internal {
        operation: format!("load template {name}: {e}"),
    })?;
    template.render(context).map_err(|e| Error::Internal {
        operation: format!("render template {name}: {e}"),
    })
}
