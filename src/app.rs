//! Terminal host: a one-shot run for scripts and a line-command session for people.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    config::{get_env_api_key, Config},
    preferences::{
        choice_labels, parse_choice, ExplanationDepth, ExtraMaterial, ImageFormat, Language,
        PreferenceForm, SolutionStyle,
    },
    request::Handler,
    session::{GenerationRecord, GenerationState, Session, SessionOptions},
    SolverError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Key,
    Image(PathBuf),
    Language(Language),
    Style(SolutionStyle),
    Depth(ExplanationDepth),
    Extra(ExtraMaterial),
    Show,
    Options,
    Generate,
    Result,
    Save(Option<PathBuf>),
    Help,
    Quit,
}

fn choice<T>(name: &str, value: &str) -> Result<T>
where
    T: clap::ValueEnum + strum::IntoEnumIterator + std::fmt::Display,
{
    parse_choice(value).ok_or_else(|| {
        eyre::eyre!(
            "unknown {name} `{value}`, choose one of: {}",
            choice_labels::<T>().join(" | ")
        )
    })
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let needs_arg = |what: &str| -> Result<()> {
        if rest.is_empty() {
            eyre::bail!("`{word}` needs {what}");
        }
        Ok(())
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "key" => {
            if !rest.is_empty() {
                eyre::bail!("type `key` on its own, the API key is then asked for without echo");
            }
            Command::Key
        }
        "image" => {
            needs_arg("a path")?;
            Command::Image(PathBuf::from(rest))
        }
        "language" | "lang" => Command::Language(choice("language", rest)?),
        "style" => Command::Style(choice("style", rest)?),
        "depth" => Command::Depth(choice("explanation depth", rest)?),
        "extra" => Command::Extra(choice("extra material", rest)?),
        "show" => Command::Show,
        "options" => Command::Options,
        "generate" | "go" => Command::Generate,
        "result" => Command::Result,
        "save" => Command::Save((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "" => eyre::bail!("empty command, type `help` for the list"),
        other => eyre::bail!("unknown command `{other}`, type `help` for the list"),
    };
    Ok(command)
}

pub const HELP: &str = "Commands:
  key                  enter the OpenAI API key for this session (hidden)
  image <path>         choose the problem screenshot (jpg, jpeg, png)
  language <value>     preferred programming language
  style <value>        solution style
  depth <value>        explanation depth
  extra <value>        additional learning material
  show                 print the current preferences
  options              list the accepted values
  generate             generate the solution and explanation
  result               print the last solution again
  save [path]          download the last solution as markdown
  help                 this text
  quit                 leave the session
Press Ctrl-C while generating to cancel.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    session: Arc<Session>,
    form: PreferenceForm,
    handler: Box<dyn Handler>,
    output: PathBuf,
    ask_secret: fn() -> Result<String>,
}

/// Ask for the API key on the terminal without echoing it.
fn prompt_api_key() -> Result<String> {
    let secret = dialoguer::Password::new()
        .with_prompt("OpenAI API Key")
        .allow_empty_password(true)
        .interact()?;
    Ok(secret)
}

impl App {
    pub fn new(session: Arc<Session>, handler: Box<dyn Handler>, output: PathBuf) -> Self {
        Self {
            session,
            form: PreferenceForm::new(),
            handler,
            output,
            ask_secret: prompt_api_key,
        }
    }

    /// Replace the terminal prompt used by `key`.
    pub fn with_secret_prompt(mut self, ask_secret: fn() -> Result<String>) -> Self {
        self.ask_secret = ask_secret;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn form_mut(&mut self) -> &mut PreferenceForm {
        &mut self.form
    }

    /// Run one command. Every user-facing error is written to `out`; only
    /// failures to write to `out` itself escape.
    pub async fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow> {
        match command {
            Command::Key => match tokio::task::spawn_blocking(self.ask_secret).await? {
                Ok(secret) if self.session.set_credential(secret.clone()) => {
                    writeln!(out, "✅ OpenAI API key updated!")?
                }
                Ok(_) => writeln!(out, "API key is empty, nothing changed.")?,
                Err(err) => writeln!(out, "❌ Unable to read the API key: {err}")?,
            },
            Command::Image(path) => match self.form.select_image_path(&path) {
                Ok(()) => {
                    let image = self.form.image().map(|i| i.bytes().len()).unwrap_or_default();
                    writeln!(out, "📷 Using {} ({image} bytes)", path.display())?;
                }
                Err(err) => writeln!(out, "❌ {err}")?,
            },
            Command::Language(language) => {
                self.form.set_language(language);
                writeln!(out, "Language: {language}")?;
            }
            Command::Style(style) => {
                self.form.set_style(style);
                writeln!(out, "Solution style: {style}")?;
            }
            Command::Depth(depth) => {
                self.form.set_depth(depth);
                writeln!(out, "Explanation depth: {depth}")?;
            }
            Command::Extra(extra) => {
                self.form.set_extra(extra);
                writeln!(out, "Additional material: {extra}")?;
            }
            Command::Show => self.show(out)?,
            Command::Options => write_options(out)?,
            Command::Generate => match self.generate().await {
                Ok(record) => render_record(&record, out)?,
                Err(err) => writeln!(out, "❌ {err}")?,
            },
            Command::Result => match self.session.record() {
                Some(record) => render_record(&record, out)?,
                None => writeln!(out, "No solution yet, run `generate` first.")?,
            },
            Command::Save(path) => {
                let target = path.unwrap_or_else(|| self.output.clone());
                match self.save(&target) {
                    Ok(Some(saved)) => writeln!(out, "📥 Solution saved to {}", saved.display())?,
                    Ok(None) => writeln!(out, "No solution yet, run `generate` first.")?,
                    Err(err) => writeln!(out, "❌ {err}")?,
                }
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub async fn generate(&self) -> Result<GenerationRecord, SolverError> {
        self.session.generate(&self.form, self.handler.as_ref()).await
    }

    /// Write the last solution; `Ok(None)` when there is nothing to save yet.
    pub fn save(&self, target: &Path) -> Result<Option<PathBuf>, SolverError> {
        match self.session.result() {
            Some(result) => Ok(Some(result.download().save_to(target)?)),
            None => Ok(None),
        }
    }

    fn show<W: Write>(&self, out: &mut W) -> Result<()> {
        let prefs = self.form.preferences();
        let image = match (self.form.image_path(), &prefs.image) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(image)) => image.file_name().to_string(),
            (None, None) => "(none)".to_string(),
        };
        let key = if self.session.has_credential() {
            "set"
        } else {
            "not set"
        };
        writeln!(out, "API key:             {key}")?;
        writeln!(out, "Screenshot:          {image}")?;
        writeln!(out, "Language:            {}", prefs.language)?;
        writeln!(out, "Solution style:      {}", prefs.style)?;
        writeln!(out, "Explanation depth:   {}", prefs.depth)?;
        writeln!(out, "Additional material: {}", prefs.extra)?;
        Ok(())
    }
}

fn write_options<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "language: {}", choice_labels::<Language>().join(" | "))?;
    writeln!(out, "style:    {}", choice_labels::<SolutionStyle>().join(" | "))?;
    writeln!(out, "depth:    {}", choice_labels::<ExplanationDepth>().join(" | "))?;
    writeln!(out, "extra:    {}", choice_labels::<ExtraMaterial>().join(" | "))?;
    writeln!(out, "image:    {}", ImageFormat::ACCEPTED_EXTENSIONS.join(", "))?;
    Ok(())
}

pub fn render_record<W: Write>(record: &GenerationRecord, out: &mut W) -> Result<()> {
    writeln!(out, "## 🖼️ Uploaded Image")?;
    writeln!(
        out,
        "{} ({} bytes, {})",
        record.image.file_name(),
        record.image.bytes().len(),
        record.image.format().mime()
    )?;
    writeln!(out)?;
    writeln!(out, "## 💡 Generated Solution & Explanation")?;
    out.write_all(record.result.as_markdown().as_bytes())?;
    writeln!(out)?;
    writeln!(
        out,
        "_Generated at {}_",
        record.generated_at.format("%Y-%m-%d %H:%M:%S")
    )?;
    Ok(())
}

/// Print progress on stderr whenever the session changes state.
fn spawn_busy_indicator(session: &Session) -> tokio::task::JoinHandle<()> {
    let mut states = session.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                GenerationState::Requesting => {
                    eprintln!("⏳ Generating solution and explanation...")
                }
                GenerationState::Failed(reason) => log::debug!("generation ended: {reason}"),
                GenerationState::Idle | GenerationState::Succeeded => {}
            }
        }
    })
}

/// Ctrl-C cancels the outstanding request instead of killing the process.
fn spawn_interrupt_handler(session: Arc<Session>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if session.cancel() {
                eprintln!("Cancelling the current request...");
            } else {
                eprintln!("Nothing to cancel, type `quit` to leave.");
            }
        }
    })
}

fn new_session(config: &Config) -> Arc<Session> {
    let session = Session::new(SessionOptions {
        model: config.model_name(),
        timeout: config.generation_timeout(),
        scratch_dir: None,
    });
    if let Some(key) = get_env_api_key() {
        session.set_credential(key);
    }
    Arc::new(session)
}

/// Generate once from the command line, print the markdown and write the download file.
pub async fn run_once(config: &Config, handler: Box<dyn Handler>) -> Result<()> {
    let session = new_session(config);
    let indicator = spawn_busy_indicator(&session);
    let interrupts = spawn_interrupt_handler(session.clone());
    let mut app = App::new(session, handler, config.output.clone());

    let form = app.form_mut();
    if let Some(image) = &config.image {
        form.select_image_path(image)?;
    }
    form.set_language(config.language);
    form.set_style(config.style);
    form.set_depth(config.depth);
    form.set_extra(config.extra);

    let outcome = app.generate().await;
    indicator.abort();
    interrupts.abort();
    let record = outcome?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(record.result.as_markdown().as_bytes())?;
    writeln!(stdout)?;
    if let Some(saved) = app.save(&config.output)? {
        log::info!("Solution saved to {}", saved.display());
    }
    Ok(())
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run_interactive(config: &Config, handler: Box<dyn Handler>) -> Result<()> {
    let session = new_session(config);
    let indicator = spawn_busy_indicator(&session);
    let interrupts = spawn_interrupt_handler(session.clone());
    let mut app = App::new(session, handler, config.output.clone());

    if let Some(image) = &config.image {
        let mut out = std::io::stdout();
        app.execute(Command::Image(image.clone()), &mut out).await?;
    }
    {
        let form = app.form_mut();
        form.set_language(config.language);
        form.set_style(config.style);
        form.set_depth(config.depth);
        form.set_extra(config.extra);
    }

    println!("💻 LeetCode Solver Bot. Type `help` for commands.");
    if !app.session().has_credential() {
        println!("🔐 Set your OpenAI API key with `key`.");
    }
    let options = app.session().options();
    println!(
        "Model: {} (timeout {}s)",
        options.model,
        options.timeout.as_secs()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let mut out = std::io::stdout();
        let flow = match parse_command(&line) {
            Ok(command) => app.execute(command, &mut out).await?,
            Err(err) => {
                writeln!(out, "{err}")?;
                Flow::Continue
            }
        };
        if flow == Flow::Quit {
            break;
        }
    }

    indicator.abort();
    interrupts.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::{future::BoxFuture, FutureExt};

    use super::*;
    use crate::request::GenerationRequest;

    struct EchoHandler {
        calls: Arc<AtomicUsize>,
    }

    impl Handler for EchoHandler {
        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BoxFuture<'a, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = format!("### 💻 Solution\n{}", request.prompt.user);
            async move { Ok(text) }.boxed()
        }
    }

    fn app(dir: &Path) -> (App, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session::new(SessionOptions {
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(5),
            scratch_dir: Some(dir.to_path_buf()),
        }));
        let handler = Box::new(EchoHandler {
            calls: calls.clone(),
        });
        let app = App::new(session, handler, dir.join("leetcode_solution.md"))
            .with_secret_prompt(|| Ok("sk-hidden-test".to_string()));
        (app, calls)
    }

    async fn run(app: &mut App, line: &str) -> String {
        let mut out = Vec::new();
        let command = parse_command(line).unwrap();
        app.execute(command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("key").unwrap(), Command::Key);
        assert_eq!(
            parse_command("image  ./shots/two sum.png ").unwrap(),
            Command::Image(PathBuf::from("./shots/two sum.png"))
        );
        assert_eq!(
            parse_command("language C++").unwrap(),
            Command::Language(Language::Cpp)
        );
        assert_eq!(
            parse_command("style Detailed & step-by-step").unwrap(),
            Command::Style(SolutionStyle::DetailedStepByStep)
        );
        assert_eq!(
            parse_command("depth test-cases").unwrap(),
            Command::Depth(ExplanationDepth::WithTestCases)
        );
        assert_eq!(
            parse_command("extra similar").unwrap(),
            Command::Extra(ExtraMaterial::SimilarProblems)
        );
        assert_eq!(parse_command("save").unwrap(), Command::Save(None));
        assert_eq!(parse_command("QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(parse_command("key sk-abc").is_err());
        assert!(parse_command("image").is_err());
        let err = parse_command("language rust").unwrap_err().to_string();
        assert!(err.contains("Python | C++ | Java | JavaScript"));
        assert!(parse_command("dance").is_err());
    }

    #[tokio::test]
    async fn test_errors_are_rendered_inline() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, calls) = app(dir.path());

        let out = run(&mut app, "generate").await;
        assert!(out.contains("Please provide your OpenAI API key first."));

        run(&mut app, "key").await;
        let out = run(&mut app, "generate").await;
        assert!(out.contains("Please upload a LeetCode problem screenshot to proceed."));

        let out = run(&mut app, "image missing.gif").await;
        assert!(out.contains("Unsupported image `missing.gif`"));

        let out = run(&mut app, "save").await;
        assert!(out.contains("No solution yet"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_or_failed_key_prompt_leaves_session_unset() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let mut app = app.with_secret_prompt(|| Ok("   ".to_string()));
        let out = run(&mut app, "key").await;
        assert!(out.contains("API key is empty"));
        assert!(!app.session().has_credential());

        let mut app = app.with_secret_prompt(|| Err(eyre::eyre!("not a terminal")));
        let out = run(&mut app, "key").await;
        assert!(out.contains("Unable to read the API key: not a terminal"));
        assert!(!app.session().has_credential());
    }

    #[tokio::test]
    async fn test_full_session() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("sample.png");
        std::fs::write(&image, b"\x89PNG").unwrap();
        let (mut app, calls) = app(dir.path());

        let out = run(&mut app, "key").await;
        assert!(out.contains("API key updated"));
        assert!(!out.contains("sk-hidden-test"));
        assert!(app.session().has_credential());
        run(&mut app, &format!("image {}", image.display())).await;
        run(&mut app, "language cpp").await;
        run(&mut app, "style beginner").await;
        run(&mut app, "extra links").await;

        let out = run(&mut app, "show").await;
        assert!(out.contains("API key:             set"));
        assert!(out.contains("Language:            C++"));
        assert!(!out.contains("sk-hidden-test"));

        let out = run(&mut app, "generate").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(out.contains("## 🖼️ Uploaded Image"));
        assert!(out.contains("sample.png (4 bytes, image/png)"));
        assert!(out.contains("**C++**"));
        assert!(out.contains("**beginner-friendly**"));
        assert!(out.contains("**relevant links**"));

        let out = run(&mut app, "save").await;
        assert!(out.contains("Solution saved to"));
        let saved = std::fs::read_to_string(dir.path().join("leetcode_solution.md")).unwrap();
        assert_eq!(saved, app.session().result().unwrap().as_markdown());

        let out = run(&mut app, "result").await;
        assert!(out.contains(saved.as_str()));

        let mut sink = Vec::new();
        let flow = app.execute(Command::Quit, &mut sink).await.unwrap();
        assert_eq!(flow, Flow::Quit);
    }
}
