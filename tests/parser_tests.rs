use crudquery::condition::{FieldCondition, SearchCondition};
use crudquery::errors::CrudError;
use crudquery::models::{QueryFilter, QuerySort, SortDirection};
use crudquery::operators::{Arity, CondOperator, CustomOperators};
use crudquery::parse::RequestQueryParser;
use serde_json::json;

fn parser() -> RequestQueryParser {
    RequestQueryParser::new()
}

// ===== FILTER / OR TRIPLES =====

#[test]
fn test_filter_triple_parses() {
    let descriptor = parser()
        .parse_query_string("filter=name||$cont||foo")
        .expect("valid filter");
    assert_eq!(
        descriptor.filters,
        vec![QueryFilter::new("name", CondOperator::Cont, json!("foo"))]
    );
}

#[test]
fn test_multiple_filters_accumulate() {
    let descriptor = parser()
        .parse_query_string("filter=age||$gte||18&filter=age||$lt||65")
        .expect("valid filters");
    assert_eq!(descriptor.filters.len(), 2);
}

#[test]
fn test_or_entries_collect_separately() {
    let descriptor = parser()
        .parse_query_string("filter=a||$eq||1&or=b||$eq||2&or=c||$eq||3")
        .expect("valid query");
    assert_eq!(descriptor.filters.len(), 1);
    assert_eq!(descriptor.or_filters.len(), 2);
}

#[test]
fn test_numeric_values_are_typed() {
    let descriptor = parser()
        .parse_query_string("filter=age||$gt||21")
        .expect("valid filter");
    assert_eq!(descriptor.filters[0].value, json!(21));
}

#[test]
fn test_array_operator_values_comma_split() {
    let descriptor = parser()
        .parse_query_string("filter=status||$in||draft,published")
        .expect("valid filter");
    assert_eq!(descriptor.filters[0].value, json!(["draft", "published"]));
}

#[test]
fn test_no_value_operator_accepts_two_parts() {
    let descriptor = parser()
        .parse_query_string("filter=deleted_at||$isnull")
        .expect("valid filter");
    assert_eq!(descriptor.filters[0].operator, CondOperator::IsNull);
}

#[test]
fn test_missing_value_for_scalar_operator_fails() {
    let err = parser()
        .parse_query_string("filter=name||$cont")
        .expect_err("no value");
    assert!(matches!(err, CrudError::Parse { .. }));
}

#[test]
fn test_bad_delimiter_count_fails() {
    let err = parser()
        .parse_query_string("filter=name||$eq||a||b")
        .expect_err("too many segments");
    assert!(matches!(err, CrudError::Parse { .. }));
}

#[test]
fn test_unknown_operator_fails() {
    let err = parser()
        .parse_query_string("filter=name||cont||foo")
        .expect_err("not an operator token");
    assert!(matches!(err, CrudError::UnsupportedOperator { .. }));
}

#[test]
fn test_unregistered_custom_operator_fails() {
    let err = parser()
        .parse_query_string("filter=location||$near||1,2")
        .expect_err("unregistered");
    assert_eq!(err, CrudError::unsupported_operator("$near"));
}

#[test]
fn test_registered_custom_operator_parses() {
    let mut registry = CustomOperators::new();
    registry.register("near", Arity::Array, |_, _| true);
    let descriptor = RequestQueryParser::new()
        .with_operators(registry)
        .parse_query_string("filter=location||$near||1,2")
        .expect("registered custom operator");
    assert_eq!(
        descriptor.filters[0].operator,
        CondOperator::Custom("near".into())
    );
    assert_eq!(descriptor.filters[0].value, json!([1, 2]));
}

// ===== OPERATOR ARITY AT PARSE TIME =====

#[test]
fn test_between_wrong_arity_fails() {
    assert!(parser().parse_query_string("filter=age||$between||1").is_err());
    assert!(
        parser()
            .parse_query_string("filter=age||$between||1,2,3")
            .is_err()
    );
    assert!(
        parser()
            .parse_query_string("filter=age||$between||1,2")
            .is_ok()
    );
}

#[test]
fn test_in_empty_array_fails() {
    let err = parser()
        .parse_query_string("filter=status||$in||")
        .expect_err("empty list");
    assert!(matches!(err, CrudError::InvalidOperatorValue { .. }));
}

#[test]
fn test_search_tree_arity_validated() {
    let err = parser()
        .parse_query_string(r#"search={"age":{"$between":[1,2,3]}}"#)
        .expect_err("bad arity inside search");
    assert!(matches!(err, CrudError::InvalidOperatorValue { .. }));
}

// ===== SEARCH =====

#[test]
fn test_search_parses_condition_tree() {
    let descriptor = parser()
        .parse_query_string(r#"search={"$or":[{"name":{"$cont":"foo"}},{"age":{"$gte":18}}]}"#)
        .expect("valid search");
    assert!(matches!(descriptor.search, Some(SearchCondition::Or(_))));
}

#[test]
fn test_malformed_search_json_fails() {
    let err = parser()
        .parse_query_string("search={broken")
        .expect_err("malformed JSON");
    assert!(matches!(err, CrudError::Parse { .. }));
}

#[test]
fn test_search_and_filter_coexist() {
    let descriptor = parser()
        .parse_query_string(r#"filter=a||$eq||1&search={"b":2}"#)
        .expect("both present");
    assert_eq!(descriptor.filters.len(), 1);
    assert!(descriptor.search.is_some());
}

// ===== JOIN =====

#[test]
fn test_join_with_select_list() {
    let descriptor = parser()
        .parse_query_string("join=company||id,name")
        .expect("valid join");
    assert_eq!(descriptor.joins[0].field, "company");
    assert_eq!(descriptor.joins[0].select, vec!["id", "name"]);
}

#[test]
fn test_join_on_conditions() {
    let descriptor = parser()
        .parse_query_string("join=company||id,name||kind:$eq:client")
        .expect("valid join");
    assert_eq!(
        descriptor.joins[0].on,
        vec![QueryFilter::new("kind", CondOperator::Eq, json!("client"))]
    );
}

#[test]
fn test_nested_join_path() {
    let descriptor = parser()
        .parse_query_string("join=company&join=company.projects")
        .expect("valid joins");
    assert_eq!(descriptor.joins.len(), 2);
    assert_eq!(descriptor.joins[1].parent_path(), Some("company"));
}

// ===== SORT =====

#[test]
fn test_sort_compact_form() {
    let descriptor = parser()
        .parse_query_string("sort=id,DESC")
        .expect("valid sort");
    assert_eq!(
        descriptor.sort,
        vec![QuerySort::new("id", SortDirection::Desc)]
    );
}

#[test]
fn test_sort_delimited_form_and_case_folding() {
    let descriptor = parser()
        .parse_query_string("sort=name||desc")
        .expect("valid sort");
    assert_eq!(descriptor.sort[0].direction, SortDirection::Desc);
}

#[test]
fn test_sort_direction_defaults_to_asc() {
    let descriptor = parser().parse_query_string("sort=name").expect("valid sort");
    assert_eq!(descriptor.sort[0].direction, SortDirection::Asc);
}

#[test]
fn test_whitespace_only_sort_field_fails() {
    let err = parser()
        .parse_query_string("sort= ,DESC")
        .expect_err("blank field");
    assert!(matches!(err, CrudError::Parse { .. }));
}

#[test]
fn test_unknown_sort_direction_fails() {
    let err = parser()
        .parse_query_string("sort=name,SIDEWAYS")
        .expect_err("bad direction");
    assert!(matches!(err, CrudError::Parse { .. }));
}

// ===== PAGINATION & FLAGS =====

#[test]
fn test_paging_parameters() {
    let descriptor = parser()
        .parse_query_string("limit=10&offset=20&page=3")
        .expect("valid paging");
    assert_eq!(descriptor.limit, Some(10));
    assert_eq!(descriptor.offset, Some(20));
    assert_eq!(descriptor.page, Some(3));
}

#[test]
fn test_non_numeric_limit_fails() {
    assert!(parser().parse_query_string("limit=ten").is_err());
    assert!(parser().parse_query_string("limit=-1").is_err());
}

#[test]
fn test_page_zero_fails() {
    assert!(parser().parse_query_string("page=0").is_err());
}

#[test]
fn test_cache_zero_requests_bypass() {
    assert!(parser().parse_query_string("cache=0").unwrap().cache_bypass);
    assert!(!parser().parse_query_string("cache=1").unwrap().cache_bypass);
    assert!(parser().parse_query_string("cache=2").is_err());
}

#[test]
fn test_include_deleted_flag() {
    assert!(
        parser()
            .parse_query_string("includeDeleted=1")
            .unwrap()
            .include_deleted
    );
    assert!(
        !parser()
            .parse_query_string("includeDeleted=0")
            .unwrap()
            .include_deleted
    );
}

#[test]
fn test_fields_merge_across_parameters() {
    let descriptor = parser()
        .parse_query_string("fields=id,name&select=created_at")
        .expect("valid fields");
    assert_eq!(descriptor.fields, vec!["id", "name", "created_at"]);
}

#[test]
fn test_unknown_parameters_ignored() {
    let descriptor = parser()
        .parse_query_string("limit=5&utm_source=mail")
        .expect("unknown ignored");
    assert_eq!(descriptor.limit, Some(5));
}

// ===== ROUND-TRIP =====

#[test]
fn test_round_trip_idempotence() {
    let parser = parser();
    for query in [
        "filter=name||$cont||foo&sort=id||DESC&limit=3",
        "fields=id,name&filter=age||$between||18,65&or=vip||$eq||true",
        r#"search={"$or":[{"name":{"$cont":"foo"}},{"age":{"$gte":18}}]}&join=company||id,name&page=2&limit=10"#,
        "filter=deleted_at||$isnull&cache=0&includeDeleted=1",
        "join=company||id,name||kind:$eq:client&offset=5",
    ] {
        let first = parser.parse_query_string(query).expect("parses");
        let encoded = parser.to_query_string(&first);
        let second = parser.parse_query_string(&encoded).expect("reparses");
        assert_eq!(first, second, "round-trip diverged for {query}");
    }
}

#[test]
fn test_search_survives_encoding() {
    let parser = parser();
    let descriptor = parser
        .parse_query_string(r#"search={"age":{"$gte":18,"$or":{"$isnull":true}}}"#)
        .expect("parses");
    let reparsed = parser
        .parse_query_string(&parser.to_query_string(&descriptor))
        .expect("reparses");
    let expected = SearchCondition::Leaf(FieldCondition {
        field: "age".into(),
        all: vec![(CondOperator::Gte, json!(18))],
        any: vec![(CondOperator::IsNull, json!(true))],
    });
    assert_eq!(reparsed.search, Some(expected));
}
