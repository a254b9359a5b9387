#![forbid(unsafe_code)]

use super::Classification;
use crate::domain::ProcessRecord;
use std::ops::Range;

/// Ports where a bare interpreter is assumed to be a dev server.
pub const DEV_PORT_BAND: Range<u16> = 3000..10000;

const INFRASTRUCTURE: &[&str] = &[
    "postgres",
    "postgresql",
    "psql",
    "redis",
    "redis-server",
    "mysql",
    "mysqld",
    "mongodb",
    "mongod",
    "docker",
    "dockerd",
    "rabbitmq",
    "elasticsearch",
    "kafka",
    "consul",
    "etcd",
];

const NODE_TOOLS: &[&str] = &[
    "vite", "next", "react", "webpack", "nodemon", "ts-node", "tsx", "remix", "svelte", "nuxt",
    "astro", "gatsby", "parcel", "rollup", "esbuild", "swc", "turbo",
];

const PYTHON_FRAMEWORKS: &[&str] = &[
    "flask",
    "django",
    "uvicorn",
    "gunicorn",
    "runserver",
    "fastapi",
    "starlette",
    "quart",
    "sanic",
];

const GO_RUNNERS: &[&str] = &["run", "air", "fresh", "fiber", "gin", "echo"];

const PROJECT_MARKERS: &[&str] = &[
    "package.json",
    "go.mod",
    "requirements.txt",
    "pom.xml",
    "build.gradle",
];

const INTERPRETERS: &[&str] = &["node", "python", "python3", "go"];

/// The lowercased text a rule looks at.
pub struct Subject {
    pub command: String,
    pub name: String,
    pub working_directory: String,
    pub port: u16,
}

impl Subject {
    pub fn new(record: &ProcessRecord) -> Self {
        Self {
            command: record.command_line().unwrap_or_default().to_lowercase(),
            name: record.name.to_lowercase(),
            working_directory: record
                .details
                .working_directory
                .as_deref()
                .map(|dir| dir.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            port: record.port,
        }
    }

    fn command_has(&self, needle: &str) -> bool {
        self.command.contains(needle)
    }

    fn command_has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.command_has(needle))
    }

    /// Whole-word match on the command line. Path separators split words,
    /// so `/usr/local/go/bin/go run .` has the words `go` and `run`.
    fn command_has_word(&self, word: &str) -> bool {
        self.command
            .split(|c: char| c.is_whitespace() || matches!(c, '/' | '\\' | '='))
            .any(|token| token == word)
    }

    fn is_interpreter(&self) -> bool {
        INTERPRETERS.contains(&self.name.as_str())
    }
}

pub struct Rule {
    pub name: &'static str,
    pub verdict: Classification,
    pub matches: fn(&Subject) -> bool,
}

/// Evaluated top to bottom; the first match decides. Anything that matches
/// nothing needs confirmation.
pub const RULES: &[Rule] = &[
    Rule {
        name: "infrastructure",
        verdict: Classification::NeedsConfirmation,
        matches: |s| {
            INFRASTRUCTURE
                .iter()
                .any(|keyword| s.command_has(keyword) || s.name.contains(keyword))
        },
    },
    Rule {
        name: "node dev tool",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has("node") && s.command_has_any(NODE_TOOLS),
    },
    Rule {
        name: "bun",
        verdict: Classification::SafeDevServer,
        matches: |s| s.name == "bun" || s.command_has_word("bun"),
    },
    Rule {
        name: "deno",
        verdict: Classification::SafeDevServer,
        matches: |s| s.name == "deno" || s.command_has_word("deno"),
    },
    Rule {
        name: "vite",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has("vite"),
    },
    Rule {
        name: "python dev server",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has("python") && s.command_has_any(PYTHON_FRAMEWORKS),
    },
    Rule {
        name: "go dev server",
        verdict: Classification::SafeDevServer,
        matches: |s| {
            s.command_has_word("go") && GO_RUNNERS.iter().any(|word| s.command_has_word(word))
        },
    },
    Rule {
        name: "ruby server",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has_any(&["rails", "rackup", "puma", "unicorn"]),
    },
    Rule {
        name: "phoenix",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has_any(&["phoenix", "mix phx.server", "elixir"]),
    },
    Rule {
        name: "cargo run",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has("cargo") && s.command_has_any(&["run", "watch"]),
    },
    Rule {
        name: "spring boot",
        verdict: Classification::SafeDevServer,
        matches: |s| {
            (s.command_has("gradle") && s.command_has("bootrun"))
                || (s.command_has("mvn") && s.command_has("spring-boot:run"))
        },
    },
    Rule {
        name: "dotnet watch",
        verdict: Classification::SafeDevServer,
        matches: |s| s.command_has("dotnet") && s.command_has("watch"),
    },
    Rule {
        name: "interpreter in project",
        verdict: Classification::SafeDevServer,
        matches: |s| {
            matches!(s.name.as_str(), "node" | "python" | "go")
                && PROJECT_MARKERS
                    .iter()
                    .any(|marker| s.working_directory.contains(marker))
        },
    },
    // Permissive on purpose: an interpreter on a dev port with no tool
    // signature at all is still treated as a dev server.
    Rule {
        name: "interpreter on dev port",
        verdict: Classification::SafeDevServer,
        matches: |s| s.is_interpreter() && DEV_PORT_BAND.contains(&s.port),
    },
];
