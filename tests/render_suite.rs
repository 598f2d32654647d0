use std::path::{Path, PathBuf};

use typst_plot_backend::canvas::{print_typ, print_typ_file};
use typst_plot_backend::config::Config;
use typst_plot_backend::{Figure, Metadata};

fn fixture(name: &str) -> Figure {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    Figure::from_path(&path).expect("fixture read failed")
}

fn render(figure: &Figure, config: &Config) -> String {
    let mut out = Vec::new();
    print_typ(figure, &mut out, config, None, &figure.metadata).expect("render failed");
    String::from_utf8(out).expect("markup is utf-8")
}

fn assert_balanced(markup: &str, fixture: &str) {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for ch in markup.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ => {}
        }
        assert!(depth >= 0, "{fixture}: unbalanced close");
    }
    assert_eq!(depth, 0, "{fixture}: unbalanced markup");
}

#[test]
fn render_all_fixtures() {
    for name in ["line_plot.json", "heatmap.json"] {
        let figure = fixture(name);
        let markup = render(&figure, &Config::default());
        assert!(markup.contains("#let draw-text("), "{name}: missing prologue");
        assert!(markup.contains("\n#block(\n"), "{name}: missing main block");
        let body = &markup[markup.find("\n#block(").unwrap_or(0)..];
        assert_balanced(body, name);
    }
}

#[test]
fn line_plot_shares_one_clip_group() {
    let markup = render(&fixture("line_plot.json"), &Config::default());
    assert_eq!(markup.matches("clip: true").count(), 1);
    // Background, data line, three markers and the axis line.
    assert_eq!(markup.matches("curve(").count(), 6);
    assert!(markup.contains("cap: \"square\""));
    assert!(markup.contains("dash: (3.7pt, 1.6pt)"));
    assert!(markup.contains("$upright(\"s\")$"));
    assert!(markup.contains("[$10^(-3)$]"));
    assert!(markup.contains("weight: 700"));
    assert!(markup.contains("angle: 270deg"));
    assert!(!markup.contains("#set page"));
}

#[test]
fn heatmap_writes_metadata_mesh_image_and_link() {
    let markup = render(&fixture("heatmap.json"), &Config::default());
    assert!(markup.contains(
        "#set document(title: \"Heatmap\", author: \"Plotter\", date: datetime(year: 2024, month: 3, day: 1))"
    ));
    assert!(markup.contains("#set page(width: 2in, height: 2in, margin: 0pt)"));
    assert_eq!(markup.matches("polygon(").count(), 2);
    assert!(markup.contains("base64.decode("));
    assert!(markup.contains("link(\n"));
    assert!(markup.contains("\"https://example.org/heat\""));
    assert!(markup.contains(r"[Heat \#1 & \*stars\*]"));
    assert!(markup.contains("style: \"italic\""));
}

#[test]
fn preamble_follows_prologue() {
    let config = Config {
        preamble: "#set text(font: \"New Computer Modern\")".to_string(),
        ..Config::default()
    };
    let markup = render(&fixture("line_plot.json"), &config);
    let preamble = markup.find("#set text(font").expect("preamble present");
    let helper = markup.find("#let draw-text(").expect("prologue present");
    let block = markup.find("\n#block(").expect("block present");
    assert!(helper < preamble && preamble < block);
}

#[test]
fn detached_images_land_next_to_output() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("nested").join("heat.typ");
    let config = Config {
        detached_images: true,
        ..Config::default()
    };
    let figure = fixture("heatmap.json");
    print_typ_file(&figure, &target, &config, &Metadata::default()).expect("render failed");

    let markup = std::fs::read_to_string(&target).expect("markup written");
    assert!(markup.contains("image(\n"));
    assert!(markup.contains("\"heat.image0.png\""));
    assert!(!markup.contains("base64.decode("));

    let image: PathBuf = tmp.path().join("nested").join("heat.image0.png");
    let bytes = std::fs::read(&image).expect("image written");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn detached_images_without_path_fail() {
    let config = Config {
        detached_images: true,
        ..Config::default()
    };
    let figure = fixture("heatmap.json");
    let mut out = Vec::new();
    let err = print_typ(&figure, &mut out, &config, None, &Metadata::default()).unwrap_err();
    assert!(err.to_string().contains("target directory is not specified"));
}

#[cfg(unix)]
mod compile {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use typst_plot_backend::Error;
    use typst_plot_backend::canvas::{Compiler, OutputFormat, print_with};

    fn fake_compiler(dir: &Path, script: &str) -> Compiler {
        let path = dir.join("typst");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("script written");
        let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("script executable");
        Compiler::new(path)
    }

    #[test]
    fn compiled_output_is_moved_to_destination() {
        let bin = tempfile::tempdir().expect("tempdir");
        // Arguments: compile, --root, --format, --diagnostic-format, --ppi, input, output.
        let compiler = fake_compiler(bin.path(), "shift 5\ncp \"$1\" \"$2\"");
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("plots").join("line.pdf");
        let figure = fixture("line_plot.json");
        print_with(
            &compiler,
            &figure,
            OutputFormat::Pdf,
            &target,
            &Config::default(),
            &Metadata::default(),
            Some(150.0),
        )
        .expect("compile succeeded");

        let copied = std::fs::read_to_string(&target).expect("output moved");
        assert!(copied.contains("author: \"typst-plot-backend\""));
        assert!(copied.contains("#set page(width: 4in, height: 3in, margin: 0pt)"));
    }

    #[test]
    fn diagnostics_are_reported() {
        let bin = tempfile::tempdir().expect("tempdir");
        let compiler = fake_compiler(
            bin.path(),
            "echo 'main.typ:7:3: error: unknown variable: nope' >&2\n\
             echo 'main.typ:9:1: warning: unused' >&2\n\
             exit 1",
        );
        let out = tempfile::tempdir().expect("tempdir");
        let target = out.path().join("line.svg");
        let err = print_with(
            &compiler,
            &fixture("line_plot.json"),
            OutputFormat::Svg,
            &target,
            &Config::default(),
            &Metadata::default(),
            None,
        )
        .unwrap_err();
        match err {
            Error::Rendering(rendering) => {
                assert_eq!(rendering.errors.len(), 1);
                assert_eq!(rendering.errors[0].line, 7);
                assert_eq!(rendering.errors[0].reason, "unknown variable: nope");
                assert!(rendering.stderr.contains("warning"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!target.exists());
    }
}
