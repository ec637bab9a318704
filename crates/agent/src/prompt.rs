//! Prompt text handed to the synthesis collaborator.

/// Inputs for the per-cycle user prompt.
#[derive(Debug, Clone, Default)]
pub struct SynthesisContext {
    /// Vault-relative archive paths, e.g. `.archive/2025-03-01/Inbox/idea.md`.
    pub archived: Vec<String>,
    /// Vault-relative paths of edited notes that stayed in place.
    pub edited: Vec<String>,
    /// `YYYY-MM-DD` date key of this cycle's archive subtree.
    pub archive_date: String,
    pub archive_folder: String,
}

const SYSTEM_PROMPT: &str = r#"You maintain the organisation of a Markdown note vault. Each cycle you receive notes that were newly captured (already moved into a dated archive folder) and existing notes that were edited since the last cycle.

## Archived notes
- Read every archived note and fold its content into master notes elsewhere in the vault.
- A master note covers exactly one topic. When an archived note mixes topics, split it across several master notes. When an existing master note has drifted into unrelated material, split it before adding to it.
- Place master notes in domain folders (Work, Personal, Learning, Projects, ...) with subfolders that narrow the topic. Aim for about five notes per folder unless the folder is a list-like collection such as journals or people.
- Keep the author's voice. Organise and clarify; do not pad notes with obvious or inferable information.
- Every master note you create or update carries front matter with `archive_links` (the archive paths it draws on) and `tags`:

```yaml
---
archive_links: [.archive/2025-01-22/original-note.md]
tags: [topic, domain]
---
```

## Edited notes
- Read first and change only what needs fixing: broken Markdown, missing or malformed front matter, missing tags.
- Well-formed notes are left alone. Moving a note to a better folder is allowed.
- Never archive an edited note.

## Links and paths
- Link related notes with wiki-links using paths from the vault root, e.g. `[[Work/Projects/Authentication System]]`.
- When you move or rename a note, update every wiki-link that points at it. When you split a note, link parent and child in both directions.
- Paths returned by search tools may start with `/`; they are still relative to the vault root, which is your working directory.

## Rules
- Do not write `last_updated`; it is stamped automatically after you finish.
- Prefer small edits over full rewrites.
- When a decision is ambiguous, make your best semantic judgement and move on."#;

/// Standing organisational policy for the collaborator.
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

pub fn build_user_prompt(context: &SynthesisContext) -> String {
    let date = &context.archive_date;
    let archive_dir = format!("{}/{date}/", context.archive_folder);

    format!(
        "# Vault cleanup for {date}\n\
         \n\
         ## Archived notes (new captures, now under {archive_dir})\n\
         {archived}\n\
         \n\
         Read each archived note and synthesise it into focused master notes.\n\
         \n\
         ## Edited notes (light cleanup only)\n\
         {edited}\n\
         \n\
         These notes already existed. Fix formatting where needed and split them only if they have outgrown a single topic.\n\
         \n\
         ## Steps\n\
         1. Survey the current vault structure and the existing master notes.\n\
         2. Process the archived notes into master notes with `archive_links` and `tags` front matter.\n\
         3. Review the edited notes.\n\
         \n\
         You are running in the vault root. This cycle's archive folder is {archive_dir}\n",
        archived = bullet_list(&context.archived),
        edited = bullet_list(&context.edited),
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "  (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
