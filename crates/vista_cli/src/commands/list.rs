//! List command - List the templates below a root directory.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use walkdir::WalkDir;

use vista_templates::dispatcher::is_public;
use vista_templates::{TemplateFlavor, TemplateStore};

use super::TemplateArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Hide partials
    #[arg(long)]
    pub public_only: bool,
}

/// A template found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedTemplate {
    pub logical: String,
    pub flavor: TemplateFlavor,
    pub public: bool,
}

/// Templates below `root` with a known flavor, sorted by logical path.
pub fn collect_templates(store: &TemplateStore, root: &Path) -> Vec<ListedTemplate> {
    let marker = store.config().partial_marker;
    let mut templates: Vec<ListedTemplate> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let extension = relative.extension()?.to_str()?;
            let flavor = store.flavor_for_extension(extension).ok()?;
            let logical = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let public = is_public(&logical, marker);
            Some(ListedTemplate {
                logical,
                flavor,
                public,
            })
        })
        .collect();
    templates.sort_by(|a, b| a.logical.cmp(&b.logical));
    templates
}

pub fn execute(args: ListArgs) -> Result<()> {
    let view = args.templates.view(Default::default())?;
    let templates = collect_templates(view.store(), &args.templates.root);

    if templates.is_empty() {
        println!("⚠️  No templates found in {:?}", args.templates.root);
        return Ok(());
    }

    for template in templates.iter().filter(|t| t.public || !args.public_only) {
        let visibility = if template.public { "public" } else { "partial" };
        println!("{:<40} {:<20} {}", template.logical, template.flavor.to_string(), visibility);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use vista_templates::RenderConfig;

    #[test]
    fn test_collect_templates() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("posts")).unwrap();
        fs::write(root.join("posts/index.erb"), "").unwrap();
        fs::write(root.join("posts/_row.erb"), "").unwrap();
        fs::write(root.join("feed.builder"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let store = TemplateStore::with_file_storage(RenderConfig::default());
        let templates = collect_templates(&store, root);

        let names: Vec<(&str, bool)> = templates
            .iter()
            .map(|t| (t.logical.as_str(), t.public))
            .collect();
        assert_eq!(
            names,
            vec![("feed", true), ("posts/_row", false), ("posts/index", true)]
        );
        assert_eq!(templates[0].flavor, TemplateFlavor::StructuredBuilder);
    }
}
