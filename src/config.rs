use std::{path::PathBuf, time::Duration};

use once_cell::sync::OnceCell;

use crate::preferences::{ExplanationDepth, ExtraMaterial, Language, SolutionStyle};

pub const CONNECT_TIMEOUT: u64 = 10;

/// Default upper bound (seconds) for one generation request.
pub const GENERATION_TIMEOUT: u64 = 60;

pub const DEFAULT_MODEL_NAME: &str = "gpt-4o";

pub const DOWNLOAD_FILE_NAME: &str = "leetcode_solution.md";

pub const DOWNLOAD_MIME: &str = "text/markdown";

pub const SCRATCH_PREFIX: &str = "leetcode-question-";

// LLM Service Interface configure options
pub static OPENAI_MODEL_NAME: OnceCell<String> = OnceCell::new();

pub static OPENAI_PROXY_BASE: OnceCell<Option<String>> = OnceCell::new();

pub fn get_openai_model_name() -> String {
    OPENAI_MODEL_NAME
        .get()
        .cloned()
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string())
}

pub fn get_openai_proxy() -> Option<String> {
    OPENAI_PROXY_BASE.get().cloned().flatten()
}

/// Read the service settings from the environment. Safe to call more than once;
/// only the first call takes effect.
pub fn init_openai_env() {
    let model = std::env::var("OPENAI_MODEL_NAME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

    let proxy_base = std::env::var("OPENAI_PROXY_BASE")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let _ = OPENAI_MODEL_NAME.set(model);
    let _ = OPENAI_PROXY_BASE.set(proxy_base);
}

/// The credential only ever comes from the environment or the interactive `key` command.
pub fn get_env_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

use clap::{Parser, ValueEnum};

/// Handler type selection
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum HandlerType {
    /// Use the async-openai client
    #[default]
    Openai,
    /// Use a plain HTTP client against an OpenAI-compatible endpoint
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "leetcode-solver", version, about = "Turn LeetCode problem screenshots into solutions with explanations", long_about = None)]
pub struct Config {
    /// Screenshot of the problem (jpg, jpeg or png).
    pub image: Option<PathBuf>,
    /// Preferred programming language for the solution.
    #[arg(short, long, value_enum, default_value_t)]
    pub language: Language,
    /// Solution style.
    #[arg(short, long, value_enum, default_value_t)]
    pub style: SolutionStyle,
    /// Explanation depth.
    #[arg(short, long, value_enum, default_value_t)]
    pub depth: ExplanationDepth,
    /// Additional learning material.
    #[arg(short, long, value_enum, default_value_t)]
    pub extra: ExtraMaterial,
    /// Model identifier. Falls back to OPENAI_MODEL_NAME, then gpt-4o.
    #[arg(short, long)]
    pub model: Option<String>,
    /// Seconds to wait for the model before giving up.
    #[arg(short, long, default_value_t = GENERATION_TIMEOUT)]
    pub timeout: u64,
    /// Select the handler type for LLM requests
    #[arg(long = "handler", value_enum, default_value_t)]
    pub handler_type: HandlerType,
    /// Where to write the downloaded solution.
    #[arg(short, long, default_value = DOWNLOAD_FILE_NAME)]
    pub output: PathBuf,
    /// Start an interactive session instead of a single generation.
    #[arg(short, long, default_value = "false")]
    pub interactive: bool,
    /// Enable debug logging.
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

impl Config {
    pub fn model_name(&self) -> String {
        self.model.clone().unwrap_or_else(get_openai_model_name)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn log_spec(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Role of the assistant, sent ahead of the instructions.
pub const SYSTEM_ROLE: &str =
    "Reads LeetCode problem screenshots and generates optimized solutions with explanations.";

/// Template of the system message. `{instructions}` is replaced by the numbered list below.
pub const SYSTEM_GEN_TEMPLATE: &str = "You are LeetCode Solver. {role}

You're a coding assistant trained to interpret visual LeetCode problem statements from screenshots and generate clean, working solutions based on user preferences. You also explain the logic in a clear, instructional format.

Follow these instructions:
{instructions}
";

pub const SYSTEM_INSTRUCTIONS: [&str; 8] = [
    "First, read and understand the problem shown in the uploaded image.",
    "Use the user's preferred programming language and solution style.",
    "Generate a correct, complete, and readable solution to the problem.",
    "After the code, include a clear explanation based on the selected explanation depth.",
    "If requested, include additional content like time and space complexity, similar problems, or external links.",
    "Format the output cleanly with markdown code blocks and bullet points where appropriate.",
    "Always structure your response using the following format:\n\n### 💻 Solution\n```<language>\n<your code here>\n```\n\n### 📘 Explanation\n<Step-by-step explanation or walkthrough here>",
    "Do not hallucinate or fabricate constraints or test cases not shown in the problem unless explicitly asked.",
];

pub const USER_GEN_TEMPLATE: &str = "A user has uploaded a screenshot of a LeetCode problem and would like your help solving it.

Please write a solution in **{language}**, using a **{style}** approach.

After the solution, provide a(n) **{depth}** explanation of the logic.

Also include **{extra}** if relevant.";

pub fn get_sys_gen_template() -> &'static str {
    pub static TEMPLATE: OnceCell<String> = OnceCell::new();
    TEMPLATE.get_or_init(|| {
        let instructions = SYSTEM_INSTRUCTIONS
            .iter()
            .enumerate()
            .map(|(idx, inst)| format!("{}. {inst}", idx + 1))
            .collect::<Vec<_>>()
            .join("\n");
        SYSTEM_GEN_TEMPLATE
            .replace("{role}", SYSTEM_ROLE)
            .replace("{instructions}", &instructions)
    })
}
