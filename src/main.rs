use iced::widget::{button, checkbox, column, container, row, slider, svg, text, text_editor};
use iced::{event, window, Alignment, Element, Event, Length, Subscription, Task, Theme};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod codec;
mod config;
mod file;
mod state;
mod typst;

use config::Config;
use file::handle::{LocalFileHandle, UserGesture};
use file::picker::{DroppedFile, FilePicker, RfdPicker};
use file::session::{FileSession, PickOutcome};
use state::data::{FileLabel, SessionState, SessionView};
use state::edit::{EditorSettings, FONT_SIZE_RANGE};
use state::prefs::JsonPreferences;
use state::store::SqliteHandleStore;
use typst::compiler::TypstCli;
use typst::graphic::Graphic;
use typst::pipeline::{RenderPipeline, RequestSequence, SourceMode, Ticket};
use typst::renderer::SvgRenderer;

type Session = FileSession<LocalFileHandle>;

/// Main application state
struct TypstGraphic {
    /// File session, shared with background tasks
    session: Arc<Mutex<Session>>,
    /// Last snapshot of the session for display
    session_view: SessionView,
    pipeline: RenderPipeline,
    prefs: Arc<JsonPreferences>,
    settings: EditorSettings,
    editor: text_editor::Content,
    /// Graphic currently shown; only the latest request may replace it
    preview: Option<Graphic>,
    renders: RequestSequence,
    /// A file operation is in flight
    busy: bool,
    status: String,
    status_is_error: bool,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// Startup restore finished
    Restored(SessionView),
    Edit(text_editor::Action),
    FontSizeChanged(f32),
    /// Slider released; the size is saved
    FontSizeCommitted,
    MathModeToggled(bool),
    PreviewRendered(Ticket, Result<Graphic, String>),
    /// User clicked "Select file"
    SelectFile,
    /// A file was dropped onto the window
    FileDropped(PathBuf),
    FileSelected(Result<PickOutcome, String>, SessionView),
    /// User clicked "Generate from file"
    GenerateFromFile,
    FileRendered(Ticket, Result<(String, Graphic), String>, SessionView),
    /// User clicked "Reconnect" on a stale file label
    Reconnect,
    Reconnected(Result<(), String>, SessionView),
    ExportSvg,
    Exported(Result<Option<PathBuf>, String>),
    EditGraphic,
    GraphicLoaded(Result<Option<Graphic>, String>),
}

impl TypstGraphic {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        let config = match Config::default_path() {
            Some(path) => Config::load(&path).unwrap_or_else(|e| {
                warn!("{}, using defaults", e);
                Config::default()
            }),
            None => Config::default(),
        };
        info!("📁 Data directory: {}", config.data_dir.display());

        let prefs = Arc::new(JsonPreferences::open(&config.data_dir));
        let store = Arc::new(SqliteHandleStore::<LocalFileHandle>::new(&config.data_dir));
        info!("🗄️ Handle store: {}", store.path().display());
        let session = FileSession::<LocalFileHandle>::new(store, prefs.clone());

        let pipeline = RenderPipeline::new(
            Arc::new(TypstCli::new(config.typst_binary.clone(), config.font_paths.clone())),
            Arc::new(SvgRenderer),
        );

        let settings = EditorSettings::load(
            prefs.as_ref(),
            EditorSettings {
                font_size: config.default_font_size,
                ..EditorSettings::default()
            }
            .clamped(),
        );

        let app = Self::with_services(session, pipeline, prefs, settings);
        let restore = {
            let session = app.session.clone();
            Task::perform(
                async move { session.lock().await.restore().await },
                Message::Restored,
            )
        };

        (app, restore)
    }

    fn with_services(
        mut session: Session,
        pipeline: RenderPipeline,
        prefs: Arc<JsonPreferences>,
        settings: EditorSettings,
    ) -> Self {
        // The stale name shows while the stored handle is checked
        let session_view = session.show_cached_name();

        TypstGraphic {
            session: Arc::new(Mutex::new(session)),
            session_view,
            pipeline,
            prefs,
            settings,
            editor: text_editor::Content::new(),
            preview: None,
            renders: RequestSequence::new(),
            busy: false,
            status: "Ready.".to_string(),
            status_is_error: false,
        }
    }

    fn set_status(&mut self, status: impl Into<String>, is_error: bool) {
        self.status = status.into();
        self.status_is_error = is_error;
    }

    /// Render the editor content; older in-flight previews become stale
    fn request_preview(&mut self) -> Task<Message> {
        let ticket = self.renders.begin();
        let code = self.editor.text();
        if code.trim().is_empty() {
            self.preview = None;
            return Task::none();
        }

        let source = SourceMode::from_math_flag(self.settings.math_mode)
            .apply(&code)
            .into_owned();
        let pipeline = self.pipeline.clone();
        let font_size = self.settings.font_size;

        Task::perform(
            async move {
                pipeline
                    .render_graphic(&source, font_size)
                    .await
                    .map_err(|e| e.to_string())
            },
            move |result| Message::PreviewRendered(ticket, result),
        )
    }

    /// Choose a file through `picker` and make it the session's file
    fn pick_file(&mut self, picker: impl FilePicker<LocalFileHandle> + 'static) -> Task<Message> {
        self.busy = true;
        let session = self.session.clone();
        Task::perform(
            async move {
                let mut session = session.lock().await;
                let outcome = session.pick(&picker).await.map_err(|e| e.to_string());
                (outcome, session.view())
            },
            |(outcome, view)| Message::FileSelected(outcome, view),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Restored(view) => {
                self.session_view = view;
                Task::none()
            }
            Message::Edit(action) => {
                let is_edit = action.is_edit();
                self.editor.perform(action);
                if is_edit {
                    return self.request_preview();
                }
                Task::none()
            }
            Message::FontSizeChanged(size) => {
                self.settings.font_size = size;
                self.request_preview()
            }
            Message::FontSizeCommitted => {
                self.settings.save(self.prefs.as_ref());
                Task::none()
            }
            Message::MathModeToggled(enabled) => {
                self.settings.math_mode = enabled;
                self.settings.save(self.prefs.as_ref());
                self.request_preview()
            }
            Message::PreviewRendered(ticket, result) => {
                if !self.renders.is_current(ticket) {
                    tracing::debug!("Dropping stale preview {:?}", ticket);
                    return Task::none();
                }
                match result {
                    Ok(graphic) => {
                        self.preview = Some(graphic);
                        self.set_status("Preview updated.", false);
                    }
                    Err(e) => {
                        self.preview = None;
                        self.set_status(e, true);
                    }
                }
                Task::none()
            }
            Message::SelectFile => self.pick_file(RfdPicker),
            Message::FileDropped(path) => {
                if self.busy {
                    warn!("Ignoring drop of {} while busy", path.display());
                    return Task::none();
                }
                self.pick_file(DroppedFile(path))
            }
            Message::FileSelected(outcome, view) => {
                self.busy = false;
                self.session_view = view;
                match outcome {
                    Ok(PickOutcome::Selected { name, persisted: true }) => {
                        self.set_status(format!("Selected {}", name), false);
                    }
                    Ok(PickOutcome::Selected { name, persisted: false }) => {
                        self.set_status(
                            format!("Selected {} (it will not be remembered after restart)", name),
                            false,
                        );
                    }
                    Ok(PickOutcome::Cancelled) => {}
                    Err(e) => self.set_status(e, true),
                }
                Task::none()
            }
            Message::GenerateFromFile => {
                self.busy = true;
                let ticket = self.renders.begin();
                let session = self.session.clone();
                let pipeline = self.pipeline.clone();
                let font_size = self.settings.font_size;

                Task::perform(
                    async move {
                        let (read, view) = {
                            let mut session = session.lock().await;
                            let read = session.read().await;
                            (read, session.view())
                        };
                        let result = match read {
                            // Files carry their own math delimiters, never wrap them
                            Ok(snapshot) => pipeline
                                .render_graphic(&SourceMode::Markup.apply(&snapshot.text), font_size)
                                .await
                                .map(|graphic| (snapshot.name, graphic))
                                .map_err(|e| e.to_string()),
                            Err(e) => Err(e.to_string()),
                        };
                        (result, view)
                    },
                    move |(result, view)| Message::FileRendered(ticket, result, view),
                )
            }
            Message::FileRendered(ticket, result, view) => {
                self.busy = false;
                self.session_view = view;
                if !self.renders.is_current(ticket) {
                    tracing::debug!("Dropping stale file render {:?}", ticket);
                    return Task::none();
                }
                match result {
                    Ok((name, graphic)) => {
                        // The file text becomes the editor content for further tweaks
                        self.editor = text_editor::Content::with_text(&graphic.source);
                        self.preview = Some(graphic);
                        self.set_status(format!("Loaded content from {}", name), false);
                    }
                    Err(e) => {
                        error!("Generate from file failed: {}", e);
                        self.preview = None;
                        self.set_status(e, true);
                    }
                }
                Task::none()
            }
            Message::Reconnect => {
                let gesture = UserGesture::from_user_action();
                let session = self.session.clone();
                Task::perform(
                    async move {
                        let mut session = session.lock().await;
                        let result = session
                            .reconnect(&gesture)
                            .await
                            .map(|_| ())
                            .map_err(|e| e.to_string());
                        (result, session.view())
                    },
                    |(result, view)| Message::Reconnected(result, view),
                )
            }
            Message::Reconnected(result, view) => {
                self.session_view = view;
                match result {
                    Ok(()) => self.set_status("File access restored.", false),
                    Err(e) => self.set_status(e, true),
                }
                Task::none()
            }
            Message::ExportSvg => {
                let Some(tagged) = self.preview.as_ref().map(Graphic::to_tagged_svg) else {
                    self.set_status("Nothing to export yet", true);
                    return Task::none();
                };
                Task::perform(export_svg(tagged), Message::Exported)
            }
            Message::Exported(result) => {
                match result {
                    Ok(Some(path)) => self.set_status(format!("Saved {}", path.display()), false),
                    Ok(None) => {}
                    Err(e) => self.set_status(e, true),
                }
                Task::none()
            }
            Message::EditGraphic => Task::perform(load_graphic(), Message::GraphicLoaded),
            Message::GraphicLoaded(result) => {
                match result {
                    Ok(Some(graphic)) => {
                        self.editor = text_editor::Content::with_text(&graphic.source);
                        self.settings = EditorSettings {
                            font_size: graphic.font_size,
                            math_mode: false,
                        }
                        .clamped();
                        self.preview = Some(graphic);
                        // Anything still rendering belongs to the old content
                        self.renders.begin();
                        self.set_status("Graphic loaded for editing.", false);
                    }
                    Ok(None) => {}
                    Err(e) => self.set_status(e, true),
                }
                Task::none()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let editor = text_editor(&self.editor)
            .placeholder("Type Typst code, e.g. x^2 + y^2 = z^2")
            .on_action(Message::Edit)
            .height(Length::Fixed(140.0));

        let settings = row![
            text("Size"),
            slider(FONT_SIZE_RANGE, self.settings.font_size, Message::FontSizeChanged)
                .on_release(Message::FontSizeCommitted)
                .step(1.0),
            text(format!("{}pt", self.settings.font_size)),
            checkbox("Math mode", self.settings.math_mode).on_toggle(Message::MathModeToggled),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let preview: Element<Message> = match &self.preview {
            Some(graphic) => svg(svg::Handle::from_memory(graphic.svg.clone().into_bytes()))
                .height(Length::Fixed(160.0))
                .into(),
            None => text("No preview").size(14).into(),
        };

        let idle = !self.busy;
        let mut file_row = row![
            button("Select file")
                .on_press_maybe(idle.then_some(Message::SelectFile))
                .padding(8),
            button("Generate from file")
                .on_press_maybe((idle && self.session_view.generate_enabled).then_some(Message::GenerateFromFile))
                .padding(8),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let stale = matches!(self.session_view.label, Some(FileLabel::LastUsed(_)))
            && self.session_view.state != SessionState::Active;
        if stale {
            file_row = file_row.push(
                button("Reconnect")
                    .on_press_maybe(idle.then_some(Message::Reconnect))
                    .padding(8),
            );
        }

        let label: Element<Message> = match &self.session_view.label {
            Some(label) if label.is_error() => text(label.text()).style(text::danger).into(),
            Some(label) => text(label.text()).into(),
            None => text("or drop a .typ file onto the window").size(14).into(),
        };

        let status: Element<Message> = if self.status_is_error {
            text(&self.status).size(14).style(text::danger).into()
        } else {
            text(&self.status).size(14).into()
        };

        let content = column![
            text("Typst Graphic").size(32),
            editor,
            settings,
            preview,
            file_row,
            label,
            row![
                button("Export SVG")
                    .on_press_maybe(self.preview.as_ref().map(|_| Message::ExportSvg))
                    .padding(8),
                button("Edit graphic").on_press(Message::EditGraphic).padding(8),
            ]
            .spacing(10),
            status,
        ]
        .spacing(16)
        .padding(24)
        .align_x(Alignment::Start);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// Files dropped anywhere on the window
    fn subscription(&self) -> Subscription<Message> {
        event::listen_with(|event, _status, _window| match event {
            Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        })
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Ask for a destination and write the tagged SVG there
async fn export_svg(svg: String) -> Result<Option<PathBuf>, String> {
    let Some(file) = rfd::AsyncFileDialog::new()
        .set_title("Export Graphic")
        .add_filter("SVG image", &["svg"])
        .set_file_name("graphic.svg")
        .save_file()
        .await
    else {
        return Ok(None);
    };
    let path = file.path().to_path_buf();
    tokio::fs::write(&path, svg)
        .await
        .map_err(|e| format!("Failed to save {}: {}", path.display(), e))?;
    info!("💾 Exported graphic to {}", path.display());
    Ok(Some(path))
}

/// Open a previously exported SVG and recover its source
async fn load_graphic() -> Result<Option<Graphic>, String> {
    let Some(file) = rfd::AsyncFileDialog::new()
        .set_title("Open Graphic")
        .add_filter("SVG image", &["svg"])
        .pick_file()
        .await
    else {
        return Ok(None);
    };
    let path = file.path().to_path_buf();
    let svg = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Graphic::from_tagged_svg(&svg)
        .map(Some)
        .map_err(|e| format!("{} has no editable source: {}", path.display(), e))
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    iced::application("Typst Graphic", TypstGraphic::update, TypstGraphic::view)
        .theme(TypstGraphic::theme)
        .subscription(TypstGraphic::subscription)
        .centered()
        .run_with(TypstGraphic::new)
}
