#![allow(clippy::unwrap_used, clippy::expect_used)]

#[cfg(feature = "sqlite")]
mod common;

#[cfg(feature = "sqlite")]
mod sqlite_repository_tests {
    use modkit_repo::{
        DeleteMode, FindOneOptions, FindOptions, Query, RepoError, Repository, Sort,
    };
    use sea_orm::RelationTrait;
    use serde::Serialize;
    use serde_json::json;

    use crate::common::{author, book, memory_db, widget, widgets};

    async fn library() -> (Repository<author::Entity>, Repository<book::Entity>) {
        let db = memory_db().await;
        (db.repository().unwrap(), db.repository().unwrap())
    }

    async fn seed_library(authors: &Repository<author::Entity>, books: &Repository<book::Entity>) {
        let created = authors
            .batch_create(
                &json!([{ "name": "Herbert" }, { "name": "Le Guin" }, { "name": "Nobody" }]),
                0,
            )
            .await
            .unwrap();
        books
            .batch_create(
                &json!([
                    { "author_id": created[0].id, "title": "Dune" },
                    { "author_id": created[0].id, "title": "Children of Dune" },
                    { "author_id": created[1].id, "title": "Earthsea" },
                ]),
                0,
            )
            .await
            .unwrap();
    }

    fn author_names(rows: &[author::Model]) -> Vec<&str> {
        rows.iter().map(|a| a.name.as_str()).collect()
    }

    async fn seed(repo: &Repository<widget::Entity>) -> Vec<widget::Model> {
        let rows = json!([
            { "name": "bolt", "status": "a", "priority": 1, "stock": 10 },
            { "name": "nut", "status": "b", "priority": 2, "stock": 20 },
            { "name": "gear", "status": "a", "priority": 3, "stock": 30 },
            { "name": "cog", "status": "b", "priority": 4, "stock": 40 },
            { "name": "axle", "status": "a", "priority": 5, "stock": 50 },
        ]);
        repo.batch_create(&rows, 2).await.unwrap()
    }

    #[tokio::test]
    async fn create_assigns_key_and_timestamps() {
        let repo = widgets().await;

        let created = repo
            .create(&json!({ "name": "bolt", "status": "new", "priority": 2 }))
            .await
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.name, "bolt");
        assert_eq!(created.stock, 0, "omitted fields keep their zero value");
        assert!(created.created_at.is_some());
        assert!(created.updated_at.is_some());
        assert!(created.deleted_at.is_none());

        let found = repo
            .find_by_id(created.id, FindOneOptions::new())
            .await
            .unwrap();
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn create_accepts_typed_input_and_ignores_unknown_fields() {
        #[derive(Serialize)]
        struct NewWidget<'a> {
            name: &'a str,
            priority: i32,
            colour: &'a str,
        }

        let repo = widgets().await;
        let created = repo
            .create(&NewWidget {
                name: "spring",
                priority: 7,
                colour: "red",
            })
            .await
            .unwrap();
        assert_eq!(created.name, "spring");
        assert_eq!(created.priority, 7);
    }

    #[tokio::test]
    async fn batch_create_keeps_input_order() {
        let repo = widgets().await;
        let rows = seed(&repo).await;

        let names: Vec<_> = rows.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["bolt", "nut", "gear", "cog", "axle"]);
        assert!(rows.iter().all(|w| w.id > 0));

        assert!(repo.batch_create(&json!([]), 10).await.unwrap().is_empty());
        assert!(
            repo.batch_create(&json!({ "name": "lonely" }), 10)
                .await
                .unwrap()
                .is_empty(),
            "non-sequence input creates nothing"
        );
        assert_eq!(repo.count(Query::All).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn find_all_filters_orders_and_paginates() {
        let repo = widgets().await;
        seed(&repo).await;

        let page = repo
            .find_all(
                Query::matching([("status", "a")]),
                FindOptions::new().order_by(Sort::desc("priority")).limit(2),
            )
            .await
            .unwrap();
        let priorities: Vec<_> = page.iter().map(|w| w.priority).collect();
        assert_eq!(priorities, [5, 3]);

        let rest = repo
            .find_all(
                Query::matching([("status", "a")]),
                FindOptions::new()
                    .order_by(Sort::desc("priority"))
                    .limit(2)
                    .offset(2),
            )
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].priority, 1);

        let none = repo
            .find_all(Query::matching([("status", "zzz")]), FindOptions::new())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn count_matches_find_all() {
        let repo = widgets().await;
        seed(&repo).await;

        let query = Query::build(|q| {
            q.more_than("priority", 1).less_than_or_equal("priority", 4);
        });
        let all = repo
            .find_all(query.clone(), FindOptions::new())
            .await
            .unwrap();
        assert_eq!(repo.count(query).await.unwrap(), all.len() as u64);
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn column_names_resolve_case_insensitively() {
        let repo = widgets().await;
        seed(&repo).await;

        let found = repo
            .find_one(Query::matching([("NAME", "gear")]), FindOneOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.priority, 3);
    }

    #[tokio::test]
    async fn projection_fills_unselected_fields_with_zero() {
        let repo = widgets().await;
        seed(&repo).await;

        let rows = repo
            .find_all(
                Query::All,
                FindOptions::new()
                    .select(["name"])
                    .order_by(Sort::asc("priority")),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].name, "bolt");
        assert!(rows.iter().all(|w| w.priority == 0 && w.id == 0));

        let statuses = repo
            .find_all(Query::All, FindOptions::new().distinct(["status"]))
            .await
            .unwrap();
        assert_eq!(statuses.len(), 2);
    }

    #[tokio::test]
    async fn soft_delete_hides_rows_until_forced() {
        let repo = widgets().await;
        let rows = seed(&repo).await;
        let id = rows[0].id;

        repo.delete_by_id(id, DeleteMode::Soft).await.unwrap();

        assert!(
            repo.find_by_id(id, FindOneOptions::new())
                .await
                .unwrap()
                .is_none()
        );
        let hidden = repo
            .find_by_id(id, FindOneOptions::new().with_deleted())
            .await
            .unwrap()
            .unwrap();
        assert!(hidden.deleted_at.is_some());
        assert_eq!(repo.count(Query::All).await.unwrap(), 4);
        assert!(
            !repo
                .exist(Query::matching([("id", id)]), FindOneOptions::new())
                .await
                .unwrap()
        );
        assert!(
            repo.exist(
                Query::matching([("id", id)]),
                FindOneOptions::new().with_deleted()
            )
            .await
            .unwrap()
        );

        assert!(matches!(
            repo.delete_by_id(id, DeleteMode::Soft).await,
            Err(RepoError::NotFound)
        ));
        repo.delete_by_id(id, DeleteMode::Force).await.unwrap();
        assert!(
            repo.find_by_id(id, FindOneOptions::new().with_deleted())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_one_without_match_is_not_found() {
        let repo = widgets().await;
        seed(&repo).await;

        let err = repo
            .delete_one(Query::matching([("name", "missing")]), DeleteMode::Soft)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn update_one_returns_stored_values() {
        let repo = widgets().await;
        let rows = seed(&repo).await;
        let before = rows[1].clone();

        let updated = repo
            .update_one(Query::matching([("name", "nut")]), &json!({ "status": "done" }))
            .await
            .unwrap();
        assert_eq!(updated.id, before.id);
        assert_eq!(updated.status, "done");
        assert_eq!(updated.name, "nut");
        assert_eq!(updated.stock, before.stock, "fields not supplied are untouched");
        assert_eq!(updated.created_at, before.created_at);
        assert!(updated.updated_at >= before.updated_at);

        let stored = repo
            .find_by_id(before.id, FindOneOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn update_never_rewrites_the_key() {
        let repo = widgets().await;
        let rows = seed(&repo).await;
        let target = rows[2].clone();

        let unchanged = repo
            .update_by_id(target.id, &json!({ "id": 999 }))
            .await
            .unwrap();
        assert_eq!(unchanged, target);

        let renamed = repo
            .update_by_id(target.id, &json!({ "id": 999, "name": "sprocket" }))
            .await
            .unwrap();
        assert_eq!(renamed.id, target.id);
        assert_eq!(renamed.name, "sprocket");
    }

    #[tokio::test]
    async fn update_without_match_is_not_found() {
        let repo = widgets().await;
        seed(&repo).await;

        assert!(matches!(
            repo.update_one(Query::matching([("name", "ghost")]), &json!({ "status": "x" }))
                .await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.update_by_id(12_345, &json!({ "status": "x" })).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_many_and_delete_many_report_row_counts() {
        let repo = widgets().await;
        seed(&repo).await;

        let changed = repo
            .update_many(Query::matching([("status", "a")]), &json!({ "priority": 9 }))
            .await
            .unwrap();
        assert_eq!(changed, 3);
        let nines = Query::build(|q| {
            q.equal("priority", 9);
        });
        assert_eq!(repo.count(nines).await.unwrap(), 3);

        let removed = repo
            .delete_many(Query::matching([("status", "a")]), DeleteMode::Soft)
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(repo.count(Query::All).await.unwrap(), 2);

        let none = repo
            .delete_many(Query::matching([("status", "zzz")]), DeleteMode::Soft)
            .await
            .unwrap();
        assert_eq!(none, 0);

        let purged = repo.delete_many(Query::All, DeleteMode::Force).await.unwrap();
        assert_eq!(purged, 5, "force removes soft-deleted rows too");
    }

    #[tokio::test]
    async fn increment_and_decrement_are_atomic() {
        let repo = widgets().await;
        let w = repo
            .create(&json!({ "name": "counter", "stock": 10 }))
            .await
            .unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let repo = repo.clone();
            tasks.spawn(async move { repo.increment(w.id, "stock", 1).await });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }
        repo.decrement(w.id, "Stock", 3).await.unwrap();

        let stored = repo
            .find_by_id(w.id, FindOneOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.stock, 17);
    }

    #[tokio::test]
    async fn increment_reports_missing_row_and_unknown_field() {
        let repo = widgets().await;
        let w = repo.create(&json!({ "name": "x" })).await.unwrap();

        assert!(matches!(
            repo.increment(w.id + 100, "stock", 1).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.increment(w.id, "nope", 1).await,
            Err(RepoError::InvalidField(f)) if f == "nope"
        ));
    }

    #[tokio::test]
    async fn invalid_column_names_fail_closed() {
        let repo = widgets().await;
        seed(&repo).await;

        let injected = Query::build(|q| {
            q.equal("name; DROP TABLE widgets", "x");
        });
        assert!(matches!(
            repo.find_all(injected, FindOptions::new()).await,
            Err(RepoError::InvalidColumn(_))
        ));
        assert!(matches!(
            repo.find_all(
                Query::All,
                FindOptions::new().order_by(Sort::asc("priority) --"))
            )
            .await,
            Err(RepoError::InvalidColumn(_))
        ));
        assert!(matches!(
            repo.delete_many(Query::matching([("1=1 OR name", "x")]), DeleteMode::Force)
                .await,
            Err(RepoError::InvalidColumn(_))
        ));

        assert_eq!(repo.count(Query::All).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn misspelled_column_never_widens_mass_mutations() {
        let repo = widgets().await;
        seed(&repo).await;

        let misspelled = || {
            Query::build(|q| {
                q.not_equal("nmae", "a");
            })
        };
        assert!(matches!(
            repo.delete_many(misspelled(), DeleteMode::Force).await,
            Err(RepoError::InvalidColumn(c)) if c == "nmae"
        ));
        assert!(matches!(
            repo.update_many(misspelled(), &json!({ "status": "z" })).await,
            Err(RepoError::InvalidColumn(_))
        ));
        assert!(matches!(
            repo.find_all(Query::All, FindOptions::new().order_by(Sort::asc("prioirty")))
                .await,
            Err(RepoError::InvalidColumn(_))
        ));

        assert_eq!(repo.count(Query::All).await.unwrap(), 5);
        assert_eq!(repo.count(Query::matching([("status", "z")])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn naive_datetime_stamp_is_filled_on_create() {
        let (authors, books) = library().await;
        let author = authors.create(&json!({ "name": "Herbert" })).await.unwrap();

        let created = books
            .create(&json!({ "author_id": author.id, "title": "Dune" }))
            .await
            .unwrap();
        assert!(created.created_at > chrono::NaiveDateTime::default());

        let found = books
            .find_by_id(created.id, FindOneOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.created_at, created.created_at);
    }

    #[tokio::test]
    async fn batch_create_stops_at_the_failing_chunk() {
        let (authors, _) = library().await;

        let rows = json!([
            { "name": "a" },
            { "name": "b" },
            { "name": "c" },
            { "name": "a" },
            { "name": "d" },
        ]);
        let res = authors.batch_create(&rows, 2).await;
        assert!(matches!(res, Err(RepoError::Store(_))));

        let stored = authors
            .find_all(Query::All, FindOptions::new().order_by(Sort::asc("name")))
            .await
            .unwrap();
        assert_eq!(author_names(&stored), ["a", "b"]);
    }

    #[tokio::test]
    async fn join_filters_on_related_columns() {
        let (authors, books) = library().await;
        seed_library(&authors, &books).await;

        let found = authors
            .find_all(
                Query::matching([("books.title", "Earthsea")]),
                FindOptions::new().join(author::Relation::Book.def()),
            )
            .await
            .unwrap();
        assert_eq!(author_names(&found), ["Le Guin"]);

        let fanned_out = Query::build(|q| {
            q.like("books.title", "%Dune");
        });
        let found = authors
            .find_all(
                fanned_out,
                FindOptions::new()
                    .join(author::Relation::Book.def())
                    .distinct(["name"]),
            )
            .await
            .unwrap();
        assert_eq!(author_names(&found), ["Herbert"]);
    }

    #[tokio::test]
    async fn related_rows_load_with_follow_up_queries() {
        let (authors, books) = library().await;
        seed_library(&authors, &books).await;

        let with_books = authors
            .find_all_with_related::<book::Entity, _>(
                Query::All,
                FindOptions::new().order_by(Sort::asc("name")),
            )
            .await
            .unwrap();
        let summary: Vec<(&str, usize)> = with_books
            .iter()
            .map(|(a, bs)| (a.name.as_str(), bs.len()))
            .collect();
        assert_eq!(summary, [("Herbert", 2), ("Le Guin", 1), ("Nobody", 0)]);

        let with_author = books
            .find_all_with_one::<author::Entity, _>(
                Query::matching([("title", "Earthsea")]),
                FindOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(with_author.len(), 1);
        assert_eq!(
            with_author[0].1.as_ref().map(|a| a.name.as_str()),
            Some("Le Guin")
        );
    }

    #[tokio::test]
    async fn unknown_qualified_column_reaches_the_engine() {
        let repo = widgets().await;
        seed(&repo).await;

        let res = repo
            .find_all(Query::matching([("ghosts.name", "red")]), FindOptions::new())
            .await;
        assert!(matches!(res, Err(RepoError::Query(_))));
    }

    #[tokio::test]
    async fn json_equality_predicate_matches_nulls() {
        let repo = widgets().await;
        seed(&repo).await;

        let q = Query::from_json(&json!({ "status": "b", "deleted_at": null })).unwrap();
        assert_eq!(repo.count(q).await.unwrap(), 2);
        assert!(Query::from_json(&json!(["status"])).is_err());
    }
}
