use super::*;
use crate::db::{EditRequest, Repository};
use time::macros::datetime;

fn now() -> OffsetDateTime {
    datetime!(2024-06-01 12:00:00 UTC)
}

fn sandbox(repo: &Repository) -> Page {
    repo.get(Namespace::main(), "Sandbox")
}

#[track_caller]
fn parse_str(repo: &Repository, content: &str) -> ParseOutput {
    parse(repo, &sandbox(repo), None, content, now()).unwrap()
}

fn save(repo: &Repository, full_title: &str, content: &str) {
    let author = repo.anonymous_principal("10.0.0.1");
    let (ns, title) = crate::title::split_title(full_title);
    let base_revision_id = repo.latest_revision(ns.id, &title, false).map(|r| r.id);
    repo.edit(EditRequest {
        author: &author,
        namespace: ns,
        title,
        content: content.to_string(),
        comment: None,
        minor: false,
        follow: false,
        hidden_category: None,
        base_revision_id,
    })
    .unwrap();
}

#[test]
fn plain_text_passes_through() {
    let repo = Repository::new();
    let output = parse_str(&repo, "Hello, world");
    assert_eq!(output.html, "Hello, world");
    assert!(!output.metadata.template_tag_error);
    assert_eq!(output.metadata.size_before, 12);
    assert_eq!(output.metadata.size_after, 12);
}

#[test]
fn comments_are_discarded() {
    let repo = Repository::new();
    assert_eq!(parse_str(&repo, "a{# hidden #}b").html, "ab");
    assert_eq!(parse_str(&repo, "{# only a comment #}").html, "");
}

#[test]
fn unterminated_comment_is_literal() {
    let repo = Repository::new();
    let output = parse_str(&repo, "a{# rest");
    assert_eq!(output.html, "a{# rest");
    assert!(!output.metadata.template_tag_error);
}

#[test]
fn expression_insertion_evaluates_parser_functions() {
    let repo = Repository::new();
    assert_eq!(parse_str(&repo, r#"{= uc "ab" =}"#).html, "AB");
    assert_eq!(parse_str(&repo, r#"{= lc "AB" =}"#).html, "ab");
    assert_eq!(parse_str(&repo, r#"{= uc_first "ab" =}"#).html, "Ab");
    assert_eq!(parse_str(&repo, r#"{= replace "a-b" "-" "+" =}"#).html, "a+b");
    assert_eq!(parse_str(&repo, r#"{= expr "2 * (3 + 4)" =}"#).html, "14");
    assert_eq!(parse_str(&repo, r#"{= if "" "yes" "no" =}"#).html, "no");
    assert_eq!(parse_str(&repo, r#"{= if_eq "a" "a" "same" "differs" =}"#).html, "same");
}

#[test]
fn string_literals_protect_delimiters() {
    let repo = Repository::new();
    assert_eq!(parse_str(&repo, r#"{= uc "a%}b" =}"#).html, "A%}B");
    assert_eq!(parse_str(&repo, r#"{= uc "a=}b" =}"#).html, "A=}B");
    assert_eq!(parse_str(&repo, r#"{= uc "a\"b" =}"#).html, r#"A"B"#);
    assert_eq!(parse_str(&repo, r#"{= "just text" =}"#).html, "just text");
}

#[test]
fn magic_variables_read_the_context() {
    let repo = Repository::new();
    assert_eq!(parse_str(&repo, "{= CURRENT_YEAR =}").html, "2024");
    assert_eq!(parse_str(&repo, "{= CURRENT_MONTH_P =}").html, "06");
    assert_eq!(parse_str(&repo, "{= CURRENT_TIME =}").html, "12:00");
    assert_eq!(parse_str(&repo, "{= CURRENT_DOW =}").html, "5"); // a Saturday
    assert_eq!(
        parse_str(&repo, "{= CURRENT_TIMESTAMP =}").html,
        now().unix_timestamp().to_string()
    );
    assert_eq!(parse_str(&repo, "{= FULL_PAGE_TITLE =}").html, "Sandbox");
    assert_eq!(parse_str(&repo, "{= NAMESPACE_ID =}").html, "0");
    assert_eq!(parse_str(&repo, "{= PAGE_PROTECTION_LEVEL =}").html, "all");
    assert_eq!(parse_str(&repo, "{= PAGE_PROTECTION_EXPIRY =}").html, "infinity");
    // No revision in context: the revision family falls back to now.
    assert_eq!(parse_str(&repo, "{= REVISION_YEAR =}").html, "2024");
    assert_eq!(parse_str(&repo, "{= REVISION_SIZE =}").html, "0");
}

#[test]
fn unknown_names_are_inline_errors() {
    let repo = Repository::new();
    let output = parse_str(&repo, "{= NO_SUCH_VARIABLE =}");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    assert!(output.metadata.template_tag_error);

    let output = parse_str(&repo, "{% frobnicate %}");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    assert!(output.metadata.template_tag_error);
}

#[test]
fn arity_violations_are_inline_errors() {
    let repo = Repository::new();
    let output = parse_str(&repo, "{= uc =}");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    let output = parse_str(&repo, r#"{= CURRENT_YEAR "extra" =}"#);
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
}

#[test]
fn include_only_is_dropped_outside_transclusion() {
    let repo = Repository::new();
    let output = parse_str(
        &repo,
        r#"Hello {% include_only %}X{% end_include_only %}{= uc "ab" =}"#,
    );
    assert_eq!(output.html, "Hello AB");
    assert!(!output.metadata.template_tag_error);
}

#[test]
fn no_include_is_kept_outside_transclusion() {
    let repo = Repository::new();
    let output = parse_str(&repo, "A{% no_include %}B{% end_no_include %}C");
    assert_eq!(output.html, "ABC");
}

#[test]
fn no_wiki_sections_render_literally() {
    let repo = Repository::new();
    let output = parse_str(&repo, r#"{% no_wiki %}{= uc "x" =} <b>{% end_no_wiki %}"#);
    assert_eq!(output.html, r#"{= uc "x" =} &lt;b&gt;"#);
    assert!(!output.metadata.template_tag_error);
}

#[test]
fn stray_and_missing_end_tags_are_errors() {
    let repo = Repository::new();
    let output = parse_str(&repo, "a{% end_no_wiki %}b");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    assert!(output.html.starts_with('a') && output.html.ends_with('b'));

    let output = parse_str(&repo, "a{% no_wiki %}b");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    assert!(output.metadata.template_tag_error);
}

#[test]
fn unclosed_tag_is_an_error() {
    let repo = Repository::new();
    let output = parse_str(&repo, "a{% no_wiki");
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
}

#[test]
fn transclusion_honours_inclusion_tags() {
    let repo = Repository::new();
    save(
        &repo,
        "Template:Greeting",
        "{% include_only %}Hello!{% end_include_only %}{% no_include %}Docs{% end_no_include %}",
    );

    // Read directly: only the documentation shows.
    let direct = parse(
        &repo,
        &repo.get(crate::title::Namespace::find_by_id(Namespace::TEMPLATE).unwrap(), "Greeting"),
        None,
        &repo.content(Namespace::TEMPLATE, "Greeting"),
        now(),
    )
    .unwrap();
    assert_eq!(direct.html, "Docs");

    // Transcluded: only the greeting shows.
    let output = parse_str(&repo, r#"{% include "Template:Greeting" %}"#);
    assert_eq!(output.html, "Hello!");
    assert!(
        output
            .metadata
            .links
            .iter()
            .any(|link| link.namespace_id == Namespace::TEMPLATE && link.title == "Greeting"),
        "{:?}",
        output.metadata.links
    );
}

#[test]
fn transclusion_of_missing_page_is_an_error() {
    let repo = Repository::new();
    let output = parse_str(&repo, r#"{% include "Template:Void" %}"#);
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
}

#[test]
fn transclusion_cycles_terminate() {
    let repo = Repository::new();
    save(&repo, "Template:Loop", r#"x{% include "Template:Loop" %}"#);
    let output = parse_str(&repo, r#"{% include "Template:Loop" %}"#);
    assert!(output.html.contains(ERROR_CLASS), "{}", output.html);
    assert!(output.html.matches('x').count() <= MAX_TRANSCLUSION_DEPTH as usize);
}

#[test]
fn wikilinks_are_recorded_and_rendered() {
    let repo = Repository::new();
    save(&repo, "Existing", "content");

    let output = parse_str(&repo, "[[Existing]] and [[Missing Page|label]]");
    assert!(output.html.contains(r#">Existing</a>"#), "{}", output.html);
    assert!(output.html.contains("wiki-red-link"), "{}", output.html);
    assert!(output.html.contains(">label"), "{}", output.html);
    let targets = output
        .metadata
        .links
        .iter()
        .map(|link| (link.namespace_id, link.title.as_str()))
        .collect::<Vec<_>>();
    assert!(targets.contains(&(0, "Existing")));
    assert!(targets.contains(&(0, "Missing Page")));
}

#[test]
fn category_links_attach_categories() {
    let repo = Repository::new();
    let output = parse_str(&repo, "Text[[Category:Trains|sort me]]");
    assert_eq!(output.html, "Text");
    assert_eq!(output.metadata.categories.len(), 1);
    assert_eq!(output.metadata.categories[0].cat_title, "Trains");
    assert_eq!(output.metadata.categories[0].sort_key.as_deref(), Some("sort me"));
}

#[test]
fn display_title_is_set_once() {
    let repo = Repository::new();
    let output = parse_str(&repo, r#"{= DISPLAY_TITLE "First" =}{= DISPLAY_TITLE "Second" =}"#);
    assert_eq!(output.display_title.as_deref(), Some("First"));
    assert!(output.metadata.template_tag_error);

    let output = parse_str(
        &repo,
        r#"{= DISPLAY_TITLE "First" =}{= DISPLAY_TITLE "Second" no_replace =}"#,
    );
    assert_eq!(output.display_title.as_deref(), Some("First"));
    assert!(!output.metadata.template_tag_error);

    let output = parse_str(&repo, r#"{= DEFAULT_SORT_KEY "K" =}"#);
    assert_eq!(output.default_sort_key.as_deref(), Some("K"));
}

#[test]
fn parses_are_deterministic() {
    let repo = Repository::new();
    let content =
        r#"{% no_wiki %}<raw>{% end_no_wiki %} [[Linked]] {= pad_left "7" "3" "0" =}"#;
    let first = parse_str(&repo, content);
    let second = parse_str(&repo, content);
    assert_eq!(first.html, second.html);
}

#[test]
fn expansion_ceiling_aborts_the_parse() {
    let repo = Repository::new();
    let mut ctx = Context::new(&repo, sandbox(&repo), None, now());
    ctx.expanded = MAX_TEXT_LENGTH;
    assert_eq!(ctx.expand_tags("x"), Err(Error::TooLarge));
}

#[test]
fn padding_functions() {
    let repo = Repository::new();
    assert_eq!(parse_str(&repo, r#"{= pad_left "7" "3" "0" =}"#).html, "007");
    assert_eq!(parse_str(&repo, r#"{= pad_right "7" "3" =}"#).html, "7  ");
}

#[test]
fn number_and_date_formatting() {
    let repo = Repository::new();
    assert_eq!(
        parse_str(&repo, r#"{= format_number "1234567.5" "en" =}"#).html,
        r#"<data value="1234567.5">1,234,567.5</data>"#
    );
    let output = parse_str(&repo, r#"{= format_date "2024-02-05T08:07:06" "fr" =}"#);
    assert_eq!(
        output.html,
        r#"<time datetime="2024-02-05T08:07:06Z">05/02/2024 08:07</time>"#
    );
    assert_eq!(parse_str(&repo, r#"{= language "fr" =}"#).html, "Français");
}
