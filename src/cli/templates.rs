use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use template_store::HintSource;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct TemplatesArgs {
    /// Only list templates of this type
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Template root (defaults to `templates.root` from the configuration)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TemplateRow {
    kind: String,
    name: String,
    scene: Option<String>,
    hint: Option<HintSource>,
    width: u32,
    height: u32,
    path: PathBuf,
    hash: String,
}

pub async fn cmd_templates(args: TemplatesArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(root) = args.root {
        config.templates.root = root;
    }
    let store = template_store::TemplateStore::new(config.store_options());
    store.load(&config.templates.root)?;

    let mut rows: Vec<TemplateRow> = store
        .snapshot()
        .iter()
        .filter(|t| args.kind.as_deref().map_or(true, |kind| t.kind() == kind))
        .map(|t| TemplateRow {
            kind: t.kind().to_string(),
            name: t.name().to_string(),
            scene: t.scene_id().map(|s| s.to_string()),
            hint: t.scene.as_ref().map(|h| h.source),
            width: t.width(),
            height: t.height(),
            path: t.path.clone(),
            hash: t.hash.clone(),
        })
        .collect();
    rows.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));

    emit(ctx.output(), &rows, |rows| {
        println!(
            "{} template(s) under {}",
            rows.len(),
            config.templates.root.display()
        );
        for row in rows {
            let scene = match (&row.scene, row.hint) {
                (Some(scene), Some(HintSource::Inferred)) => format!("  scene~{scene}"),
                (Some(scene), _) => format!("  scene={scene}"),
                _ => String::new(),
            };
            println!(
                "- {}/{} {}x{}{}",
                row.kind, row.name, row.width, row.height, scene
            );
        }
    })
}
