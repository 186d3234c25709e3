use std::collections::BTreeMap;

use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
use serde_json::json;
use uuid::Uuid;

use server::entity::problem;
use server::models::problem::Meta;

use crate::common::{MAX_ARCHIVE_SIZE, TestApp, build_zip, problem_row, routes};

const PROPS: &str = r#"{
    "name": "A+B",
    "timeLimit": 2000,
    "memoryLimit": 268435456,
    "legend": "Add two numbers",
    "input": "Two integers $a$ and $b$",
    "output": "Their sum"
}"#;

fn exec(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

fn mock_db(
    rows: Vec<Vec<problem::Model>>,
    execs: Vec<MockExecResult>,
) -> sea_orm::DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results(rows)
        .append_exec_results(execs)
        .into_connection()
}

mod problem_retrieval {
    use super::*;

    #[tokio::test]
    async fn can_retrieve_a_problem() {
        let id = Uuid::new_v4();
        let mut row = problem_row(id, 3);
        row.legend_html = "<p>hello</p>".into();
        row.meta = Meta::from_names(vec!["01".into()]);
        let app = TestApp::spawn(mock_db(vec![vec![row]], vec![])).await;

        let res = app.get(&routes::problem(id)).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["id"], id.to_string());
        assert_eq!(res.body["legend_html"], "<p>hello</p>");
        assert_eq!(res.body["meta"]["count"], 1);
        assert_eq!(res.body["meta"]["names"], json!(["01"]));
        assert!(res.body["created_at"].is_string());
    }

    #[tokio::test]
    async fn cannot_retrieve_a_nonexistent_problem() {
        let app = TestApp::spawn(mock_db(vec![vec![]], vec![])).await;

        let res = app.get(&routes::problem(Uuid::new_v4())).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod problem_listing {
    use super::*;

    fn count_row(total: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("num_items", Value::from(total))])
    }

    fn listing_db(total: i64, rows: Vec<problem::Model>) -> sea_orm::DatabaseConnection {
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(total)]])
            .append_query_results([rows])
            .into_connection()
    }

    #[tokio::test]
    async fn list_returns_paginated_results() {
        let mut first = problem_row(Uuid::new_v4(), 0);
        first.title = "Problem 0".into();
        let mut second = problem_row(Uuid::new_v4(), 0);
        second.title = "Problem 1".into();
        let app = TestApp::spawn(listing_db(3, vec![first, second])).await;

        let res = app.get(&format!("{}?per_page=2", routes::PROBLEMS)).await;

        assert_eq!(res.status, 200, "{}", res.text);
        let data = res.body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["title"], "Problem 0");
        assert!(data[0].get("legend").is_none());
        assert_eq!(res.body["pagination"]["page"], 1);
        assert_eq!(res.body["pagination"]["per_page"], 2);
        assert_eq!(res.body["pagination"]["total"], 3);
        assert_eq!(res.body["pagination"]["total_pages"], 2);
        assert!(app.executed_sql().contains("LIMIT"));
    }

    #[tokio::test]
    async fn list_filters_by_title_search() {
        let mut row = problem_row(Uuid::new_v4(), 0);
        row.title = "Binary Search".into();
        let app = TestApp::spawn(listing_db(1, vec![row])).await;

        let res = app.get(&format!("{}?search=binary", routes::PROBLEMS)).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["data"][0]["title"], "Binary Search");
        let sql = app.executed_sql();
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("%binary%"));
    }

    #[tokio::test]
    async fn list_rejects_invalid_sort_by() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let res = app
            .get(&format!("{}?sort_by=nonexistent", routes::PROBLEMS))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(app.executed_sql(), "[]");
    }
}

mod problem_deletion {
    use super::*;

    #[tokio::test]
    async fn delete_removes_the_problem_and_its_tests() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(vec![], vec![exec(1)])).await;
        app.problems
            .upload_tests_archive(id, Box::new(std::io::Cursor::new(b"zip".to_vec())))
            .await
            .unwrap();
        let stored = app.dir.path().join(format!("objects/problems/{id}/tests.zip"));
        assert!(stored.is_file());

        let res = app.delete(&routes::problem(id)).await;

        assert_eq!(res.status, 204, "{}", res.text);
        assert!(!stored.exists());
        assert!(app.executed_sql().contains("DELETE"));
    }

    #[tokio::test]
    async fn cannot_delete_a_nonexistent_problem() {
        let app = TestApp::spawn(mock_db(vec![], vec![exec(0)])).await;

        let res = app.delete(&routes::problem(Uuid::new_v4())).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod problem_update {
    use super::*;

    #[tokio::test]
    async fn update_renders_and_sanitizes_the_merged_statement() {
        let id = Uuid::new_v4();
        let mut stored = problem_row(id, 0);
        stored.input_format = "Two integers".into();
        let mut updated = stored.clone();
        updated.legend = "Add two numbers".into();
        updated.version = 1;
        let app = TestApp::spawn(mock_db(vec![vec![stored], vec![updated]], vec![exec(1)])).await;

        let res = app
            .patch(&routes::problem(id), &json!({ "legend": "  Add two numbers  " }))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["legend"], "Add two numbers");

        let requests = app.render_log.lock().unwrap().clone();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0]["from"], "latex");
        assert_eq!(requests[0]["to"], "html5");
        assert_eq!(requests[0]["html-math-method"], "katex");
        assert_eq!(
            requests[0]["text"],
            "\\begin{document}\nAdd two numbers\n\\end{document}\n"
        );
        assert_eq!(
            requests[1]["text"],
            "\\begin{document}\nTwo integers\n\\end{document}\n"
        );
        assert_eq!(requests[2]["text"], "");

        let sql = app.executed_sql();
        assert!(sql.contains("UPDATE"));
        assert!(sql.contains("<p>Add two numbers</p>"));
        assert!(sql.contains("<p>Two integers</p>"));
        assert!(!sql.contains("steal"));
        assert!(!sql.contains("<script>"));
    }

    #[tokio::test]
    async fn latex_error_in_any_field_rejects_the_update() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(vec![vec![problem_row(id, 0)]], vec![])).await;

        let res = app
            .patch(
                &routes::problem(id),
                &json!({ "legend": "fine", "notes": "\\undefined{x}" }),
            )
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert!(res.body["message"].as_str().unwrap().contains("notes"));
        assert!(!app.executed_sql().contains("UPDATE"));
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_without_side_effects() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let res = app.patch(&routes::problem(Uuid::new_v4()), &json!({})).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert!(app.render_log.lock().unwrap().is_empty());
        assert_eq!(app.executed_sql(), "[]");
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let res = app
            .client
            .patch(format!("http://{}{}", app.addr, routes::problem(Uuid::new_v4())))
            .header("content-type", "application/json")
            .body("{\"time_limit\": \"fast\"}")
            .send()
            .await
            .unwrap();
        let status = res.status().as_u16();
        let body: serde_json::Value = res.json().await.unwrap();

        assert_eq!(status, 400);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["message"].as_str().unwrap().starts_with("Invalid update fields"));
        assert_eq!(app.executed_sql(), "[]");
    }

    #[tokio::test]
    async fn out_of_range_limits_are_rejected() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        for body in [json!({ "time_limit": 0 }), json!({ "memory_limit": 100000 })] {
            let res = app.patch(&routes::problem(Uuid::new_v4()), &body).await;
            assert_eq!(res.status, 400, "{body}");
        }
    }

    #[tokio::test]
    async fn updating_a_nonexistent_problem_returns_404() {
        let app = TestApp::spawn(mock_db(vec![vec![]], vec![])).await;

        let res = app
            .patch(&routes::problem(Uuid::new_v4()), &json!({ "title": "x" }))
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn persistent_concurrent_edits_end_in_conflict() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(
            vec![
                vec![problem_row(id, 1)],
                vec![problem_row(id, 2)],
                vec![problem_row(id, 3)],
            ],
            vec![exec(0), exec(0), exec(0)],
        ))
        .await;

        let res = app
            .patch(&routes::problem(id), &json!({ "is_private": false }))
            .await;

        assert_eq!(res.status, 409, "{}", res.text);
        assert_eq!(res.body["code"], "CONFLICT");
    }
}

mod archive_upload {
    use super::*;

    #[tokio::test]
    async fn package_is_ingested_end_to_end() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(vec![vec![problem_row(id, 0)]], vec![exec(1)])).await;

        let zip = build_zip(&[
            ("statements/russian/problem-properties.json", PROPS),
            ("statements/english/problem-properties.json", "{}"),
            ("tests/01", "1 2\n"),
            ("tests/01.a", "3\n"),
            ("tests/02", "2 2\n"),
            ("tests/02.a", "4\n"),
            ("tests/.gitkeep", ""),
            ("solutions/ok.cpp", "int main() {}"),
        ]);
        let res = app.upload(&routes::problem_archive(id), zip).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["tests_key"], format!("problems/{id}/tests.zip"));
        assert_eq!(res.body["meta"], json!({ "count": 2, "names": ["01", "02"] }));

        let stored = app.dir.path().join(format!("objects/problems/{id}/tests.zip"));
        assert!(stored.is_file());

        let tests = app.problems.prepare_tests(id, "solution-7").await.unwrap();
        assert_eq!(tests, app.dir.path().join("cache/tests/solution-7"));
        assert_eq!(std::fs::read_to_string(tests.join("tests/01")).unwrap(), "1 2\n");
        assert_eq!(std::fs::read_to_string(tests.join("tests/02.a")).unwrap(), "4\n");
        assert!(!tests.join("solutions").exists());
        assert!(!tests.join("tests/.gitkeep").exists());

        let sql = app.executed_sql();
        assert!(sql.contains("A+B"));
        assert!(sql.contains("Int(Some(2000))"));
        assert!(sql.contains("Int(Some(256))"));
        assert!(sql.contains("<p>Add two numbers</p>"));
    }

    #[tokio::test]
    async fn unpaired_test_rejects_the_package() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let zip = build_zip(&[
            ("statements/russian/problem-properties.json", PROPS),
            ("tests/01", "1 2"),
            ("tests/01.a", "3"),
            ("tests/02", "2 2"),
        ]);
        let res = app.upload(&routes::problem_archive(id), zip).await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert!(res.body["message"].as_str().unwrap().contains("02"));
        assert_eq!(app.executed_sql(), "[]");
        assert!(
            !app.dir
                .path()
                .join(format!("objects/problems/{id}/tests.zip"))
                .exists()
        );
    }

    #[tokio::test]
    async fn package_without_properties_is_rejected() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let zip = build_zip(&[("tests/01", "1"), ("tests/01.a", "1")]);
        let res = app.upload(&routes::problem_archive(Uuid::new_v4()), zip).await;

        assert_eq!(res.status, 400);
        assert!(
            res.body["message"]
                .as_str()
                .unwrap()
                .contains("statements/russian/problem-properties.json")
        );
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let bytes = vec![7u8; MAX_ARCHIVE_SIZE as usize + 1];
        let res = app.upload(&routes::problem_archive(Uuid::new_v4()), bytes).await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let app = TestApp::spawn(mock_db(vec![], vec![])).await;

        let res = app
            .upload(&routes::problem_archive(Uuid::new_v4()), Vec::new())
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn upload_for_a_nonexistent_problem_stores_nothing() {
        let id = Uuid::new_v4();
        let app = TestApp::spawn(mock_db(vec![vec![]], vec![])).await;

        let zip = build_zip(&[
            ("statements/russian/problem-properties.json", PROPS),
            ("tests/01", "1"),
            ("tests/01.a", "1"),
        ]);
        let res = app.upload(&routes::problem_archive(id), zip).await;

        assert_eq!(res.status, 404);
        assert!(
            !app.dir
                .path()
                .join(format!("objects/problems/{id}/tests.zip"))
                .exists()
        );
    }
}
