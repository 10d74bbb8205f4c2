use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use pdfedit_core::{EditorCommand, EditorStore, UploadedFile};

/// One step of an edit script. Page numbers are stored 0-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Command(EditorCommand),
    Rotate { page: usize, degrees: i32 },
    Delete { page: usize },
    Duplicate { page: usize },
    Reorder { order: Vec<usize> },
    Blank,
    Text { x: f32, y: f32, text: String },
    Image { x: f32, y: f32, path: PathBuf },
    Merge { path: PathBuf },
    Export { pages: Vec<usize> },
    Save,
}

fn page(raw: &str) -> Result<usize> {
    let number: usize = raw
        .parse()
        .with_context(|| format!("invalid page number {raw:?}"))?;
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("page numbers start at 1"))
}

fn page_list(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(page)
        .collect()
}

fn coordinate(raw: &str) -> Result<f32> {
    raw.parse()
        .with_context(|| format!("invalid coordinate {raw:?}"))
}

fn arg<'a>(args: &[&'a str], index: usize, verb: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| anyhow!("`{verb}` is missing an argument"))
}

/// Parses one line. Blank lines and `#` comments yield `None`.
pub fn parse_action(line: &str) -> Result<Option<Action>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let (verb, args) = (words[0], &words[1..]);

    let action = match verb {
        "goto" => Action::Command(EditorCommand::GoToPage {
            page: page(arg(args, 0, verb)?)? + 1,
        }),
        "next" => Action::Command(EditorCommand::NextPage),
        "prev" => Action::Command(EditorCommand::PrevPage),
        "zoom-in" => Action::Command(EditorCommand::ZoomIn),
        "zoom-out" => Action::Command(EditorCommand::ZoomOut),
        "rotate" => Action::Rotate {
            page: page(arg(args, 0, verb)?)?,
            degrees: arg(args, 1, verb)?
                .parse()
                .context("rotation must be a whole number of degrees")?,
        },
        "delete" => Action::Delete {
            page: page(arg(args, 0, verb)?)?,
        },
        "duplicate" => Action::Duplicate {
            page: page(arg(args, 0, verb)?)?,
        },
        "reorder" => Action::Reorder {
            order: page_list(arg(args, 0, verb)?)?,
        },
        "blank" => Action::Blank,
        "text" => {
            let x = coordinate(arg(args, 0, verb)?)?;
            let y = coordinate(arg(args, 1, verb)?)?;
            if args.len() < 3 {
                bail!("`text` needs something to write");
            }
            Action::Text {
                x,
                y,
                text: args[2..].join(" "),
            }
        }
        "image" => Action::Image {
            x: coordinate(arg(args, 0, verb)?)?,
            y: coordinate(arg(args, 1, verb)?)?,
            path: PathBuf::from(arg(args, 2, verb)?),
        },
        "merge" => Action::Merge {
            path: PathBuf::from(arg(args, 0, verb)?),
        },
        "export" => Action::Export {
            pages: page_list(arg(args, 0, verb)?)?,
        },
        "save" => Action::Save,
        other => bail!("unknown action `{other}`"),
    };
    Ok(Some(action))
}

pub fn parse_script(source: &str) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    for (number, line) in source.lines().enumerate() {
        if let Some(action) =
            parse_action(line).with_context(|| format!("line {}: {:?}", number + 1, line))?
        {
            actions.push(action);
        }
    }
    Ok(actions)
}

pub fn load_script(path: &Path) -> Result<Vec<Action>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {:?}", path))?;
    parse_script(&source).with_context(|| format!("invalid script {:?}", path))
}

/// Applies one action to the store. Store-level failures are left in the
/// store's error slot; only failures to read referenced files are returned.
pub async fn run_action(store: &mut EditorStore, action: Action) -> Result<()> {
    match action {
        Action::Command(command) => store.apply(command),
        Action::Rotate { page, degrees } => store.rotate_page(page, degrees),
        Action::Delete { page } => store.delete_page(page),
        Action::Duplicate { page } => store.duplicate_page(page),
        Action::Reorder { order } => store.reorder_pages(&order),
        Action::Blank => store.add_blank_page(),
        Action::Text { x, y, text } => store.add_text(&text, x, y),
        Action::Image { x, y, path } => {
            let file = UploadedFile::from_path(&path).await?;
            store.add_image(file, x, y).await;
        }
        Action::Merge { path } => {
            let file = UploadedFile::from_path(&path).await?;
            store.merge_pdf(file).await;
        }
        Action::Export { pages } => store.export_pages(&pages),
        Action::Save => store.save_pdf(),
    }
    Ok(())
}
