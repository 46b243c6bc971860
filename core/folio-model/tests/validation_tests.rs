use folio_model::{Condition, Conditions, Field, FieldKind, NumberType, validate_data};
use serde_json::json;

fn post_fields() -> Vec<Field> {
    vec![
        Field::string("title"),
        Field::boolean("draft"),
        Field::datetime("date"),
        Field::image("image").optional(),
        Field::markdown("body"),
    ]
}

#[test]
fn complete_post_is_valid() {
    let data = json!({"title": "Hello", "date": "2024-01-01", "body": "Hi"});
    assert!(validate_data(&post_fields(), &data).is_empty());
}

#[test]
fn missing_required_fields_are_reported() {
    let issues = validate_data(&post_fields(), &json!({"title": "  "}));
    let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["title", "date", "body"]);
    assert!(issues.iter().all(|i| i.message == "is required"));
}

#[test]
fn non_object_data_is_rejected() {
    let issues = validate_data(&post_fields(), &json!("nope"));
    assert_eq!(issues.len(), 1);
}

#[test]
fn wrong_shapes_are_reported() {
    let fields = vec![
        Field::string("title"),
        Field::boolean("draft"),
        Field {
            kind: FieldKind::Number {
                value_type: NumberType::Int,
            },
            ..Field::string("count")
        },
    ];
    let issues = validate_data(
        &fields,
        &json!({"title": 3, "draft": "yes", "count": 1.5}),
    );
    let messages: Vec<_> = issues.iter().map(|i| i.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "title: expected a string",
            "draft: expected a boolean",
            "count: expected an integer",
        ]
    );
}

#[test]
fn select_options_are_enforced() {
    let fields = vec![Field {
        kind: FieldKind::Select {
            options: vec![json!("a"), json!({"label": "Bee", "value": "b"})],
            multiple: true,
        },
        ..Field::string("letters")
    }];
    assert!(validate_data(&fields, &json!({"letters": ["a", "b"]})).is_empty());

    let issues = validate_data(&fields, &json!({"letters": ["a", "z"]}));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "letters");
}

#[test]
fn list_items_carry_indexed_paths() {
    let fields = vec![Field::list(
        "authors",
        vec![Field::string("name"), Field::string("email").optional()],
    )];
    let issues = validate_data(
        &fields,
        &json!({"authors": [{"name": "Ada"}, {"email": "x@y.z"}, "bogus"]}),
    );
    let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["authors.1.name", "authors.2"]);
}

#[test]
fn hidden_fields_inside_list_items_are_skipped() {
    let url = Field::string("url")
        .with_condition(Conditions::One(Condition::equals("type", json!("external"))));
    let fields = vec![Field::list("links", vec![Field::string("type"), url])];

    let data = json!({"links": [
        {"type": "internal"},
        {"type": "external"}
    ]});
    let issues = validate_data(&fields, &data);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "links.1.url");
}

#[test]
fn nested_objects_are_walked() {
    let fields = vec![Field::object(
        "seo",
        vec![Field::string("title"), Field::string("description")],
    )];
    let issues = validate_data(&fields, &json!({"seo": {"title": "t"}}));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "seo.description");

    let issues = validate_data(&fields, &json!({"seo": "title"}));
    assert_eq!(issues[0].message, "expected an object");
}

#[test]
fn field_with_default_is_not_required_to_be_present() {
    let mut field = Field::string("layout");
    field.default = Some(json!("post"));
    assert!(validate_data(&[field], &json!({})).is_empty());
}
