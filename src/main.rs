//! The build definition for the webfaf static asset tree.
//!
//! Source stylesheets, scripts and icons live under `src/`; third-party
//! files come from `node_modules`. Everything is bundled into `dist/`.

use clap::Parser;
use console::style;
use smelter::{GraphError, Pipeline, Source, Stage, Task, TaskRegistry, clean};

const DIST: &str = "dist";
const DIST_CSS: &str = "dist/css";
const DIST_JS: &str = "dist/js";
const DIST_ICONS: &str = "dist/icons";
const DIST_FONTS: &str = "dist/fonts";

const NODE_MODULES: &str = "node_modules";

const SRC_CSS: &str = "src/css/*.css";
const SRC_JS: &str = "src/js/*.js";
const SRC_SCSS: &str = "src/scss/*.scss";
const SRC_ICONS: &str = "src/icons/*.png";

const FLOT: [&str; 3] = [
    "node_modules/flot/jquery.flot.js",
    "node_modules/flot/jquery.flot*.js",
    "node_modules/flot-axislabels/jquery.flot.axislabels.js",
];

const CSS_TO_MOVE: [&str; 4] = [
    "node_modules/bootstrap-multiselect/dist/css/bootstrap-multiselect.css",
    "node_modules/bootstrap-tagsinput/dist/bootstrap-tagsinput.css",
    "node_modules/daterangepicker/daterangepicker.css",
    "node_modules/typeahead.js-bootstrap-css/typeaheadjs.css",
];

const JS_TO_MOVE: [&str; 9] = [
    "node_modules/bootstrap/dist/js/bootstrap.min.js",
    "node_modules/bootstrap-multiselect/dist/js/bootstrap-multiselect.js",
    "node_modules/bootstrap-tagsinput/dist/bootstrap-tagsinput.min.js",
    "node_modules/datatables/media/js/jquery.dataTables.min.js",
    "node_modules/daterangepicker/daterangepicker.js",
    "node_modules/jquery/dist/jquery.min.js",
    "node_modules/moment/min/moment.min.js",
    "node_modules/patternfly/dist/js/patternfly.min.js",
    "node_modules/typeahead.js/dist/typeahead.bundle.min.js",
];

const MAP_TO_MOVE: [&str; 2] = [
    "node_modules/bootstrap-tagsinput/dist/bootstrap-tagsinput.min.js.map",
    "node_modules/patternfly/node_modules/jquery/dist/jquery.min.map",
];

/// The `glob` crate has no brace alternation, so the font extensions are
/// expanded into one pattern each.
fn font_patterns() -> Vec<String> {
    ["eot", "otf", "svg", "ttf", "woff", "woff2"]
        .iter()
        .map(|ext| format!("node_modules/patternfly/dist/fonts/*.{ext}"))
        .collect()
}

/// A task that resolves `source`, runs it through `pipeline` and writes the
/// result under `dest`.
fn pipe_task(name: &str, source: Source, pipeline: Pipeline, dest: &'static str) -> Task {
    Task::new(name).action(move || {
        let handles = pipeline.run(source.resolve()?)?;
        smelter::write(dest, &handles)?;
        Ok(())
    })
}

/// A plain copy: resolve and write, no transforms.
fn copy_task(name: &str, source: Source, dest: &'static str) -> Task {
    Task::new(name).action(move || {
        smelter::write(dest, &source.resolve()?)?;
        Ok(())
    })
}

fn registry() -> Result<TaskRegistry, GraphError> {
    TaskRegistry::config()
        // Move font files from patternfly to dist.
        .add_task(copy_task("build:fonts", Source::new(font_patterns()), DIST_FONTS))
        // Move icons from src to dist.
        .add_task(copy_task("build:icons", Source::new([SRC_ICONS]), DIST_ICONS))
        // Move css files from node_modules to dist.
        .add_task(copy_task("copy:css", Source::new(CSS_TO_MOVE), DIST_CSS))
        // Compile stylesheets from source to minified css.
        .add_task(
            pipe_task(
                "build:styles",
                Source::new([SRC_SCSS]),
                Pipeline::guarded([
                    Stage::scss([NODE_MODULES, "node_modules/patternfly/node_modules"]),
                    Stage::extension("css"),
                    Stage::suffix(".min"),
                ]),
                DIST_CSS,
            ),
        )
        // Bundle project css into a single minified file.
        .add_task(
            pipe_task(
                "build:css",
                Source::new([SRC_CSS]),
                Pipeline::guarded([Stage::concat("style.min.css"), Stage::minify(minify_css)]),
                DIST_CSS,
            )
            .depends_on(["copy:css", "build:styles"]),
        )
        // Move source map files from node_modules to dist.
        .add_task(copy_task("copy:map", Source::new(MAP_TO_MOVE), DIST_JS))
        // Move js files from node_modules to dist.
        .add_task(copy_task("copy:js", Source::new(JS_TO_MOVE), DIST_JS).depends_on(["copy:map"]))
        // Bundle and minify the flot plotting library.
        .add_task(
            pipe_task(
                "js:flot",
                Source::new(FLOT),
                Pipeline::guarded([Stage::concat("jquery.flot.min.js"), Stage::minify(minify_js)]),
                DIST_JS,
            ),
        )
        // Minify project js into dist.
        .add_task(
            pipe_task(
                "build:js",
                Source::new([SRC_JS]),
                Pipeline::guarded([Stage::minify(minify_js), Stage::flatten(), Stage::suffix(".min")]),
                DIST_JS,
            )
            .depends_on(["copy:js", "js:flot"]),
        )
        // Aggregates.
        .add_task(
            Task::new("build:dist").depends_on(["build:css", "build:js", "build:fonts", "build:icons"]),
        )
        .add_task(Task::new("clean:dist").action(|| Ok(clean([DIST])?)))
        .add_task(Task::new("clean:modules").action(|| Ok(clean([NODE_MODULES])?)))
        .add_task(Task::new("clean:all").depends_on(["clean:dist", "clean:modules"]))
        .finish()
}

// Stand-in minifier collaborators. Real minification is out of scope for
// the engine; these strip comments and surplus whitespace, which is enough
// for the hand-written sources in this tree.

fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => return out,
        }
    }

    out.push_str(rest);
    out
}

fn minify_css(text: &str) -> String {
    let text = strip_block_comments(text);
    let mut out = text.split_whitespace().collect::<Vec<_>>().join(" ");

    for token in ["{", "}", ";", ":", ","] {
        out = out
            .replace(&format!(" {token}"), token)
            .replace(&format!("{token} "), token);
    }

    out
}

fn minify_js(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| {
            let line = line.trim_start();
            !line.is_empty() && !line.starts_with("//")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Parser)]
#[command(name = "smelter", version, about = "Build the static asset bundle")]
struct Cli {
    /// Task names to run.
    #[arg(default_values_t = [String::from("build:dist")])]
    tasks: Vec<String>,

    /// List the registered tasks and exit.
    #[arg(long)]
    list: bool,
}

#[cfg(feature = "logging")]
fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    #[cfg(feature = "logging")]
    init_logging();

    let cli = Cli::parse();

    let registry = match registry() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{}", style(&err).red());
            std::process::exit(1);
        }
    };

    if cli.list {
        let mut names: Vec<_> = registry.tasks().map(|task| task.name()).collect();
        names.sort_unstable();
        for name in names {
            println!("{name}");
        }
        return;
    }

    eprintln!(
        "Running {} for {}",
        style("Smelter").red(),
        style(cli.tasks.join(", ")).blue()
    );

    if let Err(err) = smelter::run(&registry, &cli.tasks) {
        eprintln!("{}", style(&err).red());
        std::process::exit(1);
    }
}
