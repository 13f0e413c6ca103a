#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod clean;
mod error;
mod output;
mod pipeline;
mod scheduler;
mod source;
mod task;

pub use crate::clean::clean;
pub use crate::error::{
    BuildError, CleanError, GraphError, PipelineError, ResolveError, WriteError,
};
pub use crate::output::{FileData, FileHandle, write};
pub use crate::pipeline::{Pipeline, Stage};
pub use crate::scheduler::run;
pub use crate::source::Source;
pub use crate::task::{RegistryConfig, Task, TaskRegistry};

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::{Utf8Path, Utf8PathBuf};

    use super::*;

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap().to_owned();

        for (path, text) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        (temp, root)
    }

    /// A registry shaped like the real build: four independent asset tasks
    /// joined by an aggregate, each selecting, transforming and writing
    /// files. `css_compile_ok` controls whether the css task hits an
    /// uncontained compile failure.
    fn asset_registry(root: &Utf8Path, css_compile_ok: bool) -> TaskRegistry {
        let dist = root.join("dist");

        let css = {
            let source = Source::new([format!("{root}/src/css/*.css")]);
            let dest = dist.join("css");
            let pipeline = Pipeline::new([
                Stage::compile(move |text| {
                    if css_compile_ok {
                        Ok(text.to_string())
                    } else {
                        anyhow::bail!("bad stylesheet")
                    }
                }),
                Stage::concat("style.min.css"),
                Stage::minify(|text| text.replace('\n', "")),
            ]);

            Task::new("css").action(move || {
                let handles = pipeline.run(source.resolve()?)?;
                write(&dest, &handles)?;
                Ok(())
            })
        };

        let js = {
            let source = Source::new([format!("{root}/src/js/*.js")]);
            let dest = dist.join("js");
            let pipeline = Pipeline::new([Stage::suffix(".min")]);

            Task::new("js").action(move || {
                let handles = pipeline.run(source.resolve()?)?;
                write(&dest, &handles)?;
                Ok(())
            })
        };

        let copy = |name: &str, pattern: String, dest: Utf8PathBuf| {
            let source = Source::new([pattern]);
            Task::new(name).action(move || {
                write(&dest, &source.resolve()?)?;
                Ok(())
            })
        };

        TaskRegistry::config()
            .add_task(css)
            .add_task(js)
            .add_task(copy(
                "fonts",
                format!("{root}/vendor/fonts/*.woff"),
                dist.join("fonts"),
            ))
            .add_task(copy(
                "icons",
                format!("{root}/src/icons/*.png"),
                dist.join("icons"),
            ))
            .add_task(Task::new("dist").depends_on(["css", "js", "fonts", "icons"]))
            .finish()
            .unwrap()
    }

    #[test]
    fn test_full_build() {
        let (_temp, root) = fixture(&[
            ("src/css/a.css", "a{}\n"),
            ("src/css/b.css", "b{}\n"),
            ("src/js/app.js", "app();"),
            ("src/icons/logo.png", "png"),
            ("vendor/fonts/sans.woff", "woff"),
        ]);

        run(&asset_registry(&root, true), &["dist"]).unwrap();

        let dist = root.join("dist");
        assert_eq!(
            fs::read_to_string(dist.join("css/style.min.css")).unwrap(),
            "a{}b{}"
        );
        assert!(dist.join("js/app.min.js").is_file());
        assert!(dist.join("fonts/sans.woff").is_file());
        assert!(dist.join("icons/logo.png").is_file());
    }

    #[test]
    fn test_failing_task_leaves_completed_siblings_on_disk() {
        let (_temp, root) = fixture(&[
            ("src/css/a.css", "a{}\n"),
            ("src/js/app.js", "app();"),
            ("src/icons/logo.png", "png"),
            ("vendor/fonts/sans.woff", "woff"),
        ]);

        let err = run(&asset_registry(&root, false), &["dist"]).unwrap_err();
        assert!(matches!(&err, BuildError::Task { name, .. } if name == "css"));

        // Siblings were concurrently eligible, so they ran to completion.
        let dist = root.join("dist");
        assert!(dist.join("js/app.min.js").is_file());
        assert!(dist.join("fonts/sans.woff").is_file());
        assert!(dist.join("icons/logo.png").is_file());
        assert!(!dist.join("css/style.min.css").exists());
    }
}
