use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::app::state::pop_grapheme;
use crate::app::App;
use crate::config::AppConfig;
use crate::notes::{
    Attachment, DragSlot, Group, Note, NoteController, NoteDraft, NoteId, Partition,
};
use crate::remote::RemoteStore;
use crate::session::{auth, SessionHandle};

/// Everything a command needs: loaded config, the shared session and a backend.
#[derive(Clone)]
pub struct Workspace {
    pub config: Arc<AppConfig>,
    pub session: SessionHandle,
    pub remote: Arc<dyn RemoteStore>,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Account email (prompted if omitted)
    #[arg(long)]
    pub email: Option<String>,
    /// Account password (prompted if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Display name (prompted if omitted)
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show notes whose title or body contains this text
    #[arg(long, short)]
    pub search: Option<String>,
    /// Include archived notes
    #[arg(long, short)]
    pub archived: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteRef {
    /// Note identifier as shown by `list`
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note (prompted if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Display color, e.g. "#FFDD57"
    #[arg(long)]
    pub color: Option<String>,
    /// Attach an image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier as shown by `list`
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long, conflicts_with = "clear_color")]
    pub color: Option<String>,
    /// Remove the note's color
    #[arg(long)]
    pub clear_color: bool,
    /// Attach an image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier as shown by `list`
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    /// Current position in the "Notes" section (1-based)
    pub from: usize,
    /// Target position in the "Notes" section (1-based)
    pub to: usize,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn login(ws: &Workspace, args: LoginArgs) -> Result<String> {
    let email = value_or_prompt(args.email, "Email")?;
    let password = secret_or_prompt(args.password, "Password")?;
    auth::login(ws.remote.as_ref(), &ws.session, &email, &password)?;
    Ok(format!("Signed in as {}.", email.trim()))
}

pub fn register(ws: &Workspace, args: RegisterArgs) -> Result<String> {
    let name = value_or_prompt(args.name, "Name")?;
    let email = value_or_prompt(args.email, "Email")?;
    let password = secret_or_prompt(args.password, "Password")?;
    auth::register(ws.remote.as_ref(), &name, &email, &password)?;
    Ok("Registration successful! Please login.".to_string())
}

pub fn logout(ws: &Workspace) -> Result<String> {
    auth::logout(&ws.session).context("clearing stored session")?;
    Ok("Signed out.".to_string())
}

pub fn list(ws: &Workspace, args: ListArgs) -> Result<String> {
    let mut controller = signed_in(ws)?;
    let collection = controller.collection_mut();
    collection.set_search_term(args.search.unwrap_or_default());
    collection.set_show_archived(args.archived || ws.config.dashboard.show_archived);
    Ok(format_listing(&controller, ws.config.preview_lines as usize))
}

pub fn show(ws: &Workspace, args: NoteRef) -> Result<String> {
    let mut controller = signed_in(ws)?;
    let id = NoteId::from(args.id.as_str());
    let note = controller
        .view(&id)
        .with_context(|| format!("note #{id} not found"))?;
    Ok(format_detail(note, &ws.config.remote.uploads_url))
}

pub fn new_note(ws: &Workspace, args: NewArgs) -> Result<String> {
    let title = value_or_prompt(args.title, "Title")?;
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    let draft = NoteDraft {
        title,
        body,
        color: args.color.filter(|color| !color.trim().is_empty()),
        attachments: read_attachments(&args.images)?,
    };
    let mut controller = signed_in(ws)?;
    controller.create(ws.remote.as_ref(), draft.clone())?;
    Ok(format!(
        "Created note \"{}\"{}",
        draft.title.trim(),
        attachment_suffix(draft.attachments.len())
    ))
}

pub fn edit_note(ws: &Workspace, args: EditArgs) -> Result<String> {
    let mut controller = signed_in(ws)?;
    let id = NoteId::from(args.id.as_str());
    let mut draft = controller
        .begin_edit(&id)
        .with_context(|| format!("note #{id} not found"))?;
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(body) = args.body {
        draft.body = body;
    }
    if args.clear_color {
        draft.color = None;
    } else if let Some(color) = args.color {
        draft.color = Some(color).filter(|color| !color.trim().is_empty());
    }
    draft.attachments = read_attachments(&args.images)?;
    let attachments = draft.attachments.len();
    controller.update(ws.remote.as_ref(), id.clone(), draft)?;
    Ok(format!("Updated note #{id}{}", attachment_suffix(attachments)))
}

pub fn delete_note<F>(ws: &Workspace, args: DeleteArgs, confirm: F) -> Result<String>
where
    F: FnOnce(&Note) -> bool,
{
    let mut controller = signed_in(ws)?;
    let id = NoteId::from(args.id.as_str());
    let yes = args.yes;
    let deleted = controller.delete(ws.remote.as_ref(), id.clone(), |note| yes || confirm(note))?;
    if deleted {
        Ok(format!("Deleted note #{id}"))
    } else {
        Ok("Delete canceled".to_string())
    }
}

pub fn toggle_pin(ws: &Workspace, args: NoteRef) -> Result<String> {
    let mut controller = signed_in(ws)?;
    let id = NoteId::from(args.id.as_str());
    controller.toggle_pin(ws.remote.as_ref(), id.clone())?;
    let pinned = controller
        .collection()
        .get(&id)
        .map(|note| note.pinned)
        .unwrap_or_default();
    Ok(format!(
        "{} note #{id}",
        if pinned { "Pinned" } else { "Unpinned" }
    ))
}

pub fn toggle_archive(ws: &Workspace, args: NoteRef) -> Result<String> {
    let mut controller = signed_in(ws)?;
    let id = NoteId::from(args.id.as_str());
    controller.toggle_archive(ws.remote.as_ref(), id.clone())?;
    let archived = controller
        .collection()
        .get(&id)
        .map(|note| note.archived)
        .unwrap_or_default();
    Ok(format!(
        "{} note #{id}",
        if archived { "Archived" } else { "Restored" }
    ))
}

pub fn move_note(ws: &Workspace, args: MoveArgs) -> Result<String> {
    if args.from == 0 || args.to == 0 {
        bail!("positions start at 1");
    }
    let mut controller = signed_in(ws)?;
    let total = controller.collection().partitioned().unpinned.len();
    if args.from > total || args.to > total {
        bail!("the Notes section has {total} note(s)");
    }
    let moved = controller.move_note(
        ws.remote.as_ref(),
        DragSlot::new(Group::Unpinned, args.from - 1),
        DragSlot::new(Group::Unpinned, args.to - 1),
    )?;
    if moved {
        Ok(format!("Moved note from position {} to {}", args.from, args.to))
    } else {
        Ok("Order unchanged".to_string())
    }
}

pub fn confirm_delete_prompt(note: &Note) -> bool {
    match prompt(&format!("Delete \"{}\"? [y/N]", note.title)) {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(err) => {
            tracing::warn!(?err, "failed to read confirmation");
            false
        }
    }
}

fn signed_in(ws: &Workspace) -> Result<NoteController> {
    if !ws.session.read().is_signed_in() {
        bail!("not signed in; run `notedeck login` first");
    }
    let mut controller = NoteController::new(ws.session.clone());
    controller.load(ws.remote.as_ref())?;
    Ok(controller)
}

fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    paths.iter().map(|path| Attachment::from_path(path)).collect()
}

fn attachment_suffix(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => " with 1 image".to_string(),
        n => format!(" with {n} images"),
    }
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

fn secret_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt_secret(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

/// Reads a password without echo. Piped input is read as a plain line.
fn prompt_secret(label: &str) -> Result<String> {
    if !atty::is(atty::Stream::Stdin) {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        return Ok(input.trim_end_matches(['\r', '\n']).to_owned());
    }
    let mut stdout = io::stdout();
    write!(stdout, "{label}: ")?;
    stdout.flush()?;
    enable_raw_mode().context("enabling raw mode")?;
    let keys = std::iter::from_fn(|| loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => return Some(Ok(key)),
            Ok(_) => continue,
            Err(err) => return Some(Err(err)),
        }
    });
    let secret = collect_secret(keys);
    disable_raw_mode().context("disabling raw mode")?;
    writeln!(stdout)?;
    secret
}

fn collect_secret<I>(keys: I) -> Result<String>
where
    I: IntoIterator<Item = io::Result<KeyEvent>>,
{
    let mut secret = String::new();
    for key in keys {
        let key = key.context("reading password input")?;
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Char('c') if control => bail!("password entry canceled"),
            KeyCode::Backspace => pop_grapheme(&mut secret),
            KeyCode::Char(ch) if !control => secret.push(ch),
            _ => {}
        }
    }
    Ok(secret)
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn format_listing(controller: &NoteController, preview_lines: usize) -> String {
    let collection = controller.collection();
    let mut out = String::new();
    if let Some(identity) = controller.identity() {
        let _ = writeln!(&mut out, "Signed in as {} <{}>", identity.name, identity.email);
        out.push('\n');
    }
    let groups = collection.partitioned();
    let visible = groups.display_order(collection.show_archived());
    if visible.is_empty() {
        if collection.search_term().trim().is_empty() {
            out.push_str("No notes yet.\n");
        } else {
            let _ = writeln!(&mut out, "No notes match \"{}\".", collection.search_term());
        }
        return out;
    }
    write_group(&mut out, &groups, Group::Pinned, preview_lines);
    write_group(&mut out, &groups, Group::Unpinned, preview_lines);
    if collection.show_archived() {
        write_group(&mut out, &groups, Group::Archived, preview_lines);
    }
    out
}

fn write_group(out: &mut String, groups: &Partition<'_>, group: Group, preview_lines: usize) {
    let notes = groups.group(group);
    if notes.is_empty() {
        return;
    }
    let _ = writeln!(out, "{group} ({})", notes.len());
    for (index, note) in notes.iter().enumerate() {
        let mut headline = format!("{:>3}. {}  [#{}]", index + 1, note.title, note.id);
        if group == Group::Archived && note.pinned {
            headline.push_str("  (pinned)");
        }
        if let Some(color) = &note.color {
            let _ = write!(headline, "  {color}");
        }
        if note.image.is_some() {
            headline.push_str("  +image");
        }
        let _ = writeln!(out, "{headline}");
        for line in preview(&note.body, preview_lines) {
            let _ = writeln!(out, "     {line}");
        }
    }
}

fn preview(body: &str, max_lines: usize) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .map(|line| line.chars().take(72).collect())
        .collect()
}

fn format_detail(note: &Note, uploads_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "#{}  {}", note.id, note.title);
    let mut flags = Vec::new();
    if note.pinned {
        flags.push("pinned");
    }
    if note.archived {
        flags.push("archived");
    }
    if !flags.is_empty() {
        let _ = writeln!(&mut out, "    status  {}", flags.join(", "));
    }
    if let Some(color) = &note.color {
        let _ = writeln!(&mut out, "    color   {color}");
    }
    if let Some(url) = note.attachment_url(uploads_url) {
        let _ = writeln!(&mut out, "    image   {url}");
    }
    out.push('\n');
    out.push_str(&note.body);
    if !note.body.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::collection::note;
    use crate::remote::fake::{Call, FakeRemote};
    use crate::session::SessionStore;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn workspace(notes: Vec<Note>) -> TestResult<(TempDir, Workspace, Arc<FakeRemote>)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let session = SessionStore::open(temp.path().join("session.json"))?.into_handle();
        let remote = Arc::new(FakeRemote::with_notes(notes));
        let config = AppConfig {
            preview_lines: 1,
            ..AppConfig::default()
        };
        let ws = Workspace {
            config: Arc::new(config),
            session,
            remote: remote.clone(),
        };
        Ok((temp, ws, remote))
    }

    fn signed_in_workspace(notes: Vec<Note>) -> TestResult<(TempDir, Workspace, Arc<FakeRemote>)> {
        let (temp, ws, remote) = workspace(notes)?;
        ws.session.write().set_token("token".into())?;
        Ok((temp, ws, remote))
    }

    fn sample() -> Vec<Note> {
        let mut trip = note(2, "Trip", "pack bags", false, false);
        trip.color = Some("#ffdd57".into());
        vec![
            note(1, "Groceries", "milk\neggs", true, false),
            trip,
            note(3, "Ideas", "", false, false),
            note(4, "Old", "done", true, true),
        ]
    }

    #[test]
    fn cli_list_groups_sections() -> TestResult {
        let (_temp, ws, _remote) = signed_in_workspace(sample())?;
        let output = list(
            &ws,
            ListArgs {
                search: None,
                archived: true,
            },
        )?;
        insta::assert_snapshot!(output, @r###"
        Signed in as Ada <ada@example.com>

        Pinned (1)
          1. Groceries  [#1]
             milk
        Notes (2)
          1. Trip  [#2]  #ffdd57
             pack bags
          2. Ideas  [#3]
        Archived (1)
          1. Old  [#4]  (pinned)
             done
        "###);
        Ok(())
    }

    #[test]
    fn cli_list_hides_archived_and_filters() -> TestResult {
        let (_temp, ws, _remote) = signed_in_workspace(sample())?;
        let output = list(&ws, ListArgs::default())?;
        assert!(!output.contains("Archived"));

        let output = list(
            &ws,
            ListArgs {
                search: Some("BAGS".into()),
                archived: false,
            },
        )?;
        assert!(output.contains("Trip"));
        assert!(!output.contains("Groceries"));

        let output = list(
            &ws,
            ListArgs {
                search: Some("nothing".into()),
                archived: false,
            },
        )?;
        assert!(output.contains("No notes match \"nothing\"."));
        Ok(())
    }

    #[test]
    fn cli_requires_login_before_listing() -> TestResult {
        let (_temp, ws, remote) = workspace(sample())?;
        let err = list(&ws, ListArgs::default()).unwrap_err();
        assert!(err.to_string().contains("notedeck login"));
        assert!(remote.calls().is_empty());
        Ok(())
    }

    #[test]
    fn cli_login_then_logout() -> TestResult {
        let (_temp, ws, remote) = workspace(Vec::new())?;
        let output = login(
            &ws,
            LoginArgs {
                email: Some("ada@example.com".into()),
                password: Some("pw".into()),
            },
        )?;
        assert_eq!(output, "Signed in as ada@example.com.");
        assert_eq!(remote.calls(), vec![Call::Login("ada@example.com".into())]);
        assert!(ws.session.read().is_signed_in());

        logout(&ws)?;
        assert!(!ws.session.read().is_signed_in());
        Ok(())
    }

    fn key(code: KeyCode) -> io::Result<KeyEvent> {
        Ok(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn password_input_handles_backspace_and_enter() -> TestResult {
        let keys = vec![
            key(KeyCode::Char('p')),
            key(KeyCode::Char('w')),
            key(KeyCode::Backspace),
            key(KeyCode::Char('x')),
            key(KeyCode::Tab),
            key(KeyCode::Enter),
            key(KeyCode::Char('z')),
        ];
        assert_eq!(collect_secret(keys)?, "px");
        Ok(())
    }

    #[test]
    fn password_input_can_be_canceled() {
        let keys = vec![
            key(KeyCode::Char('p')),
            Ok(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        ];
        let err = collect_secret(keys).unwrap_err();
        assert!(err.to_string().contains("canceled"));
    }

    #[test]
    fn cli_new_note_rejects_blank_title() -> TestResult {
        let (_temp, ws, remote) = signed_in_workspace(sample())?;
        let err = new_note(
            &ws,
            NewArgs {
                title: Some("   ".into()),
                body: Some("body".into()),
                color: None,
                images: Vec::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Title is required.");
        assert!(!remote
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Create { .. })));
        Ok(())
    }

    #[test]
    fn cli_new_note_uploads_images() -> TestResult {
        let (temp, ws, remote) = signed_in_workspace(sample())?;
        let image = temp.path().join("map.png");
        std::fs::write(&image, [1u8, 2, 3])?;
        let output = new_note(
            &ws,
            NewArgs {
                title: Some("Map".into()),
                body: Some(String::new()),
                color: Some("".into()),
                images: vec![image],
            },
        )?;
        assert_eq!(output, "Created note \"Map\" with 1 image");
        assert!(remote.calls().contains(&Call::Create {
            title: "Map".into(),
            attachments: 1
        }));
        let created = remote
            .server_notes()
            .into_iter()
            .find(|note| note.title == "Map")
            .expect("created on server");
        assert_eq!(created.color, None);
        Ok(())
    }

    #[test]
    fn cli_edit_keeps_untouched_fields() -> TestResult {
        let (_temp, ws, remote) = signed_in_workspace(sample())?;
        edit_note(
            &ws,
            EditArgs {
                id: "2".into(),
                title: Some("Road trip".into()),
                body: None,
                color: None,
                clear_color: false,
                images: Vec::new(),
            },
        )?;
        let edited = remote
            .server_notes()
            .into_iter()
            .find(|note| note.id == NoteId::from(2))
            .expect("note present");
        assert_eq!(edited.title, "Road trip");
        assert_eq!(edited.body, "pack bags");
        assert_eq!(edited.color.as_deref(), Some("#ffdd57"));
        Ok(())
    }

    #[test]
    fn cli_delete_asks_unless_forced() -> TestResult {
        let (_temp, ws, remote) = signed_in_workspace(sample())?;
        let output = delete_note(
            &ws,
            DeleteArgs {
                id: "3".into(),
                yes: false,
            },
            |_| false,
        )?;
        assert_eq!(output, "Delete canceled");
        assert_eq!(remote.server_notes().len(), 4);

        let output = delete_note(
            &ws,
            DeleteArgs {
                id: "3".into(),
                yes: true,
            },
            |_| panic!("confirmation should be skipped"),
        )?;
        assert_eq!(output, "Deleted note #3");
        assert_eq!(remote.server_notes().len(), 3);
        Ok(())
    }

    #[test]
    fn cli_pin_and_archive_report_new_state() -> TestResult {
        let (_temp, ws, _remote) = signed_in_workspace(sample())?;
        assert_eq!(toggle_pin(&ws, NoteRef { id: "3".into() })?, "Pinned note #3");
        assert_eq!(
            toggle_archive(&ws, NoteRef { id: "4".into() })?,
            "Restored note #4"
        );
        Ok(())
    }

    #[test]
    fn cli_move_uses_one_based_positions() -> TestResult {
        let (_temp, ws, remote) = signed_in_workspace(sample())?;
        assert!(move_note(&ws, MoveArgs { from: 0, to: 1 }).is_err());
        assert!(move_note(&ws, MoveArgs { from: 1, to: 3 }).is_err());

        let output = move_note(&ws, MoveArgs { from: 2, to: 1 })?;
        assert_eq!(output, "Moved note from position 2 to 1");
        assert!(remote
            .calls()
            .contains(&Call::PersistOrder(vec![NoteId::from(3), NoteId::from(2)])));
        Ok(())
    }

    #[test]
    fn cli_show_prints_attachment_url() -> TestResult {
        let mut notes = sample();
        notes[1].image = Some("map.png".into());
        let (_temp, ws, _remote) = signed_in_workspace(notes)?;
        let output = show(&ws, NoteRef { id: "2".into() })?;
        assert!(output.starts_with("#2  Trip\n"));
        assert!(output.contains("    image   http://localhost:5000/uploads/notes/map.png"));
        assert!(output.ends_with("pack bags\n"));
        Ok(())
    }
}
