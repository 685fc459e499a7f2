use std::collections::BTreeMap;

use tex_bucket_core::graph;
use tex_bucket_core::merge::{merge, merge_with_extension};
use tex_bucket_core::tokenizer::clean;
use tex_bucket_core::StructureError;

fn pool(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect()
}

#[test]
fn single_level_substitution() {
    let merged = merge(pool(&[("main.tex", "A\n\\input{b}\nC\n"), ("b.tex", "B\n")]), "main.tex")
        .expect("merge");
    assert_eq!(merged.text, "A\nB\nC\n");
    assert_eq!(merged.root, "main.tex");
    assert_eq!(merged.included, ["b.tex", "main.tex"]);
}

#[test]
fn nested_and_repeated_includes_are_all_substituted() {
    let merged = merge(
        pool(&[
            ("main.tex", "\\input{a}\n--\n\\include{a}\n"),
            ("a.tex", "a(\\input{sub/b})\n"),
            ("sub/b.tex", "b\n"),
        ]),
        "main.tex",
    )
    .expect("merge");
    assert_eq!(merged.text, "a(b)\n--\na(b)\n");
    assert!(!merged.text.contains("\\input"));
}

#[test]
fn three_file_document_round_trip() {
    let raw = pool(&[
        (
            "main.tex",
            "\\documentclass{article}\n% setup\n\\begin{document}\n\\input{sections/intro}\n\\include{listing}\n\\end{document}\n",
        ),
        ("sections/intro.tex", "We reach 50\\% accuracy. % cite later\n"),
        (
            "listing.tex",
            "\\begin{verbatim}\nx = 1 % literal\n\\end{verbatim}\n",
        ),
    ]);
    let cleaned: BTreeMap<String, String> =
        raw.iter().map(|(k, v)| (k.clone(), clean(v))).collect();
    let root = graph::build(&cleaned, ".tex").validate().expect("valid");

    let merged = merge(cleaned, &root).expect("merge");

    assert_eq!(
        merged.text,
        "\\documentclass{article}\n\\begin{document}\nWe reach 50\\% accuracy.\n\\begin{verbatim}\nx = 1 % literal\n\\end{verbatim}\n\\end{document}\n"
    );
    assert_eq!(merged.included.len(), 3);
}

#[test]
fn chained_includes_keep_each_files_literal_block() {
    let raw = pool(&[
        (
            "main.tex",
            "\\documentclass{article}\n% preamble note\n\\begin{document}\n\\input{intro}\n\\begin{verbatim}\nmain % kept\n\\end{verbatim}\n\\end{document}\n",
        ),
        (
            "intro.tex",
            "Intro text. % drop me\n\\input{fig}\n\\begin{lstlisting}\nintro % kept\n\\end{lstlisting}\n",
        ),
        (
            "fig.tex",
            "\\begin{minted}{python}\nfig % kept\n\\end{minted}\nFigure 50\\% done. % gone\n",
        ),
    ]);
    let cleaned: BTreeMap<String, String> =
        raw.iter().map(|(k, v)| (k.clone(), clean(v))).collect();
    let root = graph::build(&cleaned, ".tex").validate().expect("valid");
    assert_eq!(root, "main.tex");

    let merged = merge(cleaned, &root).expect("merge");

    assert_eq!(
        merged.text,
        "\\documentclass{article}\n\\begin{document}\nIntro text.\n\\begin{minted}{python}\nfig % kept\n\\end{minted}\nFigure 50\\% done.\n\\begin{lstlisting}\nintro % kept\n\\end{lstlisting}\n\\begin{verbatim}\nmain % kept\n\\end{verbatim}\n\\end{document}\n"
    );
    assert_eq!(merged.included, ["fig.tex", "intro.tex", "main.tex"]);
    assert!(!merged.text.contains("\\input"));
    // Only literal comments are left, so cleaning again changes nothing.
    assert_eq!(clean(&merged.text), merged.text);
}

#[test]
fn directives_inside_literal_regions_are_left_alone() {
    let text = "\\begin{verbatim}\n\\input{chapter}\n\\end{verbatim}\nUse \\verb|\\include{file}| or \\input{real}.\n";
    let merged = merge(pool(&[("main.tex", text), ("real.tex", "R\n")]), "main.tex").expect("merge");
    assert_eq!(
        merged.text,
        "\\begin{verbatim}\n\\input{chapter}\n\\end{verbatim}\nUse \\verb|\\include{file}| or R.\n"
    );
    assert_eq!(merged.included, ["main.tex", "real.tex"]);
}

#[test]
fn unvalidated_missing_target_is_an_error() {
    let err = merge(pool(&[("main.tex", "\\input{nope}\n")]), "main.tex").unwrap_err();
    assert_eq!(
        err,
        StructureError::MissingInclusionTarget(vec!["nope.tex".to_string()])
    );
}

#[test]
fn unvalidated_cycle_is_bounded() {
    let err = merge(
        pool(&[("main.tex", "\\input{a}\n"), ("a.tex", "\\input{a}\n")]),
        "main.tex",
    )
    .unwrap_err();
    assert!(matches!(err, StructureError::CyclicInclusion(_)));
}

#[test]
fn other_source_extensions() {
    let merged = merge_with_extension(
        pool(&[("main.ltx", "x \\input{y}"), ("y.ltx", "y")]),
        "main.ltx",
        ".ltx",
    )
    .expect("merge");
    assert_eq!(merged.text, "x y");
}
