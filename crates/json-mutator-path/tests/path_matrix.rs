use json_mutator_path::{json_match, util, Path, PathSegment};
use serde_json::{json, Value};

fn matched(expr: &str, doc: &Value) -> Vec<(String, Value)> {
    let path = Path::parse(expr).unwrap_or_else(|e| panic!("parse failed for '{expr}': {e}"));
    json_match(doc, &path)
        .into_iter()
        .map(|m| (m.path.to_string(), m.value.clone()))
        .collect()
}

fn sample() -> Value {
    json!({
        "title": "Post",
        "tags": ["a", "b", "c", "d"],
        "body": [
            {"_key": "p1", "_type": "block", "text": "one"},
            {"_key": "p2", "_type": "block", "text": "two"},
            {"_key": "p3", "_type": "image"}
        ],
        "odd key": {"nested": true}
    })
}

#[test]
fn parser_string_round_trip_matrix() {
    let cases = [
        "",
        "title",
        "a.b.c",
        "tags[0]",
        "tags[-1]",
        r#"body[_key=="p2"].text"#,
        "tags[1:3]",
        "tags[:2]",
        "tags[2:]",
        "tags[:]",
        "body[*]",
        "[*]",
        "tags[0,2]",
        r#"body[_key=="p1",_key=="p3"]"#,
        "['odd key'].nested",
        "['']",
        "['0']",
    ];
    for case in cases {
        let parsed = Path::parse(case).unwrap_or_else(|e| panic!("parse failed for '{case}': {e}"));
        assert_eq!(parsed.to_string(), case, "round trip of '{case}'");
    }
}

#[test]
fn parser_normalizes_alternate_spellings() {
    let cases = [
        ("a['b']", "a.b"),
        ("a[\"b\"]", "a.b"),
        ("a.*", "a[*]"),
        ("*", "[*]"),
        ("a[ 1 : 2 ]", "a[1:2]"),
        ("body[_key=='x']", r#"body[_key=="x"]"#),
        ("a[ 0 , 1 ]", "a[0,1]"),
    ];
    for (input, printed) in cases {
        assert_eq!(Path::parse(input).unwrap().to_string(), printed, "input '{input}'");
    }
}

#[test]
fn parser_rejects_malformed_input() {
    for case in ["a.", "a..b", "a[", "a[1", "a[1]]", "a[x]", ".a", "a b", "a['x]", r"a['\q']"] {
        assert!(Path::parse(case).is_err(), "'{case}' should not parse");
    }
}

#[test]
fn match_concrete_paths() {
    let doc = sample();
    assert_eq!(matched("title", &doc), vec![("title".into(), json!("Post"))]);
    assert_eq!(matched("tags[-2]", &doc), vec![("tags[2]".into(), json!("c"))]);
    assert_eq!(
        matched(r#"body[_key=="p2"].text"#, &doc),
        vec![(r#"body[_key=="p2"].text"#.into(), json!("two"))]
    );
    assert_eq!(matched("['odd key'].nested", &doc).len(), 1);
}

#[test]
fn match_missing_paths_yield_nothing() {
    let doc = sample();
    for expr in ["nope", "title.length", "tags[10]", r#"body[_key=="zz"]"#, "body[2].text", "tags[5:]"] {
        assert!(matched(expr, &doc).is_empty(), "'{expr}' should not match");
    }
}

#[test]
fn match_ranges_and_wildcards_in_document_order() {
    let doc = sample();
    let tags: Vec<String> = matched("tags[1:3]", &doc).into_iter().map(|(p, _)| p).collect();
    assert_eq!(tags, vec!["tags[1]", "tags[2]"]);

    let texts: Vec<Value> = matched("body[*].text", &doc).into_iter().map(|(_, v)| v).collect();
    assert_eq!(texts, vec![json!("one"), json!("two")]);

    let top: Vec<String> = matched("*", &doc).into_iter().map(|(p, _)| p).collect();
    assert_eq!(top, vec!["title", "tags", "body", "['odd key']"]);
}

#[test]
fn match_union_keeps_member_order() {
    let doc = sample();
    let picked: Vec<Value> = matched("tags[3,0]", &doc).into_iter().map(|(_, v)| v).collect();
    assert_eq!(picked, vec![json!("d"), json!("a")]);
}

#[test]
fn keyed_paths_resolve_to_indices_on_demand() {
    let doc = sample();
    let path = Path::parse(r#"body[_key=="p3"]._type"#).unwrap();
    assert_eq!(util::to_indexed(&doc, &path).to_string(), "body[2]._type");
    assert_eq!(util::get(&doc, &path), Some(&json!("image")));
}

#[test]
fn segment_array_wire_form() {
    let path = Path::from_json(&json!(["body", {"_key": "p1"}, "text"])).unwrap();
    assert_eq!(path.to_string(), r#"body[_key=="p1"].text"#);
    assert_eq!(path.segments[1], PathSegment::Keyed("p1".into()));
    assert_eq!(path.to_json(), json!(r#"body[_key=="p1"].text"#));
}
