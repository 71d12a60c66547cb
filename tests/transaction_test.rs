//! Transactions and savepoint nesting against PostgreSQL

mod common;

use common::{by_tag, contact, setup, unique_tag};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use futures::FutureExt;
use storekit::prelude::*;

async fn count_tag(kit: &StoreKit, tag: &str) -> i64 {
    kit.contacts()
        .count(ListOptions::new().filter(by_tag(tag)))
        .await
        .unwrap()
}

/// First names of the committed contacts under `tag`, sorted
async fn names_for_tag(kit: &StoreKit, tag: &str) -> Vec<String> {
    let page = kit
        .contacts()
        .list(ListOptions::new().filter(by_tag(tag)).sort_by("first_name", SortOrder::Asc))
        .await
        .unwrap();
    page.data().iter().map(|c| c.first_name.clone()).collect()
}

#[tokio::test]
async fn test_commit_makes_rows_visible() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    let saved = kit
        .with_transaction(|tx| {
            let tag = tag.clone();
            async move {
                let mut c = contact("Committed", &tag);
                tx.contacts().save(&mut c).await?;
                Ok(c)
            }
        })
        .await
        .unwrap();

    assert_eq!(count_tag(&kit, &tag).await, 1);
    assert!(kit.contacts().get(saved.id()).await.is_ok());
}

#[tokio::test]
async fn test_error_rolls_back() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    let err = kit
        .with_transaction(|tx| {
            let tag = tag.clone();
            async move {
                let mut c = contact("RolledBack", &tag);
                tx.contacts().save(&mut c).await?;
                tx.contacts().get(i64::MAX).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(count_tag(&kit, &tag).await, 0);
}

#[tokio::test]
async fn test_inner_savepoint_rollback_keeps_outer_work() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    kit.with_transaction(|outer| {
        let tag = tag.clone();
        async move {
            let mut a = contact("Outer", &tag);
            outer.contacts().save(&mut a).await?;

            let inner = outer
                .with_transaction(|inner| {
                    let tag = tag.clone();
                    async move {
                        assert_eq!(inner.connection().depth(), 2);
                        assert!(inner.connection().savepoint().is_some());
                        let mut b = contact("Inner", &tag);
                        inner.contacts().save(&mut b).await?;
                        Err::<(), _>(StoreError::validation("inner", "abort"))
                    }
                })
                .await;
            assert!(inner.is_err());

            let visible = outer
                .contacts()
                .count(ListOptions::new().filter(by_tag(&tag)))
                .await?;
            assert_eq!(visible, 1);
            Ok(())
        }
    })
    .await
    .unwrap();

    let page = kit
        .contacts()
        .list(ListOptions::new().filter(by_tag(&tag)))
        .await
        .unwrap();
    let names: Vec<&str> = page.data().iter().map(|c| c.first_name.as_str()).collect();
    assert_eq!(names, vec!["Outer"]);
}

#[tokio::test]
async fn test_outer_rollback_discards_released_savepoint() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    let result = kit
        .with_transaction(|outer| {
            let tag = tag.clone();
            async move {
                outer
                    .with_transaction(|inner| {
                        let tag = tag.clone();
                        async move {
                            let mut c = contact("Inner", &tag);
                            inner.contacts().save(&mut c).await
                        }
                    })
                    .await?;
                Err::<(), _>(StoreError::validation("outer", "abort"))
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(count_tag(&kit, &tag).await, 0);
}

#[tokio::test]
async fn test_closed_handle_refuses_statements() {
    let Some(kit) = setup().await else { return };

    let tx = kit.connection().begin().await.unwrap();
    tx.commit().await.unwrap();
    assert!(tx.is_closed());

    let store = kit.contacts().with_connection(tx.clone());
    let err = store.get(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoActiveTransaction);
    assert_eq!(tx.commit().await.unwrap_err().kind(), ErrorKind::NoActiveTransaction);
    assert!(tx.rollback().await.is_ok());
}

#[tokio::test]
async fn test_commit_on_root_handle_fails() {
    let Some(kit) = setup().await else { return };
    let err = kit.connection().commit().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoActiveTransaction);
}

#[tokio::test]
async fn test_panic_rolls_back_and_resumes() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    let outcome = AssertUnwindSafe(kit.with_transaction(|tx| {
        let tag = tag.clone();
        async move {
            let mut c = contact("Panicked", &tag);
            tx.contacts().save(&mut c).await?;
            if c.id() > 0 {
                panic!("boom");
            }
            Ok(())
        }
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(count_tag(&kit, &tag).await, 0);
}

#[tokio::test]
async fn test_outer_writes_after_inner_rollback_are_kept() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    kit.with_transaction(|outer| {
        let tag = tag.clone();
        async move {
            let mut before = contact("Before", &tag);
            outer.contacts().save(&mut before).await?;

            let inner = outer
                .with_transaction(|inner| {
                    let tag = tag.clone();
                    async move {
                        let mut c = contact("Inner", &tag);
                        inner.contacts().save(&mut c).await?;
                        Err::<(), _>(StoreError::validation("inner", "abort"))
                    }
                })
                .await;
            assert!(inner.is_err());

            let mut after = contact("After", &tag);
            outer.contacts().save(&mut after).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(names_for_tag(&kit, &tag).await, vec!["After", "Before"]);
}

#[tokio::test]
async fn test_inner_and_outer_commit_keep_both_writes() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    kit.with_transaction(|outer| {
        let tag = tag.clone();
        async move {
            let mut a = contact("Outer", &tag);
            outer.contacts().save(&mut a).await?;

            outer
                .with_transaction(|inner| {
                    let tag = tag.clone();
                    async move {
                        let mut b = contact("Inner", &tag);
                        inner.contacts().save(&mut b).await
                    }
                })
                .await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(names_for_tag(&kit, &tag).await, vec!["Inner", "Outer"]);
}

#[tokio::test]
async fn test_cancelled_inner_scope_is_rolled_back_on_commit() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    kit.with_transaction(|outer| {
        let tag = tag.clone();
        async move {
            let cancelled = tokio::time::timeout(
                Duration::from_millis(200),
                outer.with_transaction(|inner| {
                    let tag = tag.clone();
                    async move {
                        let mut c = contact("Cancelled", &tag);
                        inner.contacts().save(&mut c).await?;
                        std::future::pending::<Result<(), StoreError>>().await
                    }
                }),
            )
            .await;
            assert!(cancelled.is_err());
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(count_tag(&kit, &tag).await, 0);
}

#[tokio::test]
async fn test_cancelled_inner_scope_keeps_outer_work() {
    let Some(kit) = setup().await else { return };
    let tag = unique_tag();

    kit.with_transaction(|outer| {
        let tag = tag.clone();
        async move {
            let mut before = contact("Before", &tag);
            outer.contacts().save(&mut before).await?;

            let cancelled = tokio::time::timeout(
                Duration::from_millis(200),
                outer.with_transaction(|inner| {
                    let tag = tag.clone();
                    async move {
                        let mut c = contact("Cancelled", &tag);
                        inner.contacts().save(&mut c).await?;
                        std::future::pending::<Result<(), StoreError>>().await
                    }
                }),
            )
            .await;
            assert!(cancelled.is_err());

            // The abandoned savepoint is undone before this statement runs
            assert_eq!(
                outer
                    .contacts()
                    .count(ListOptions::new().filter(by_tag(&tag)))
                    .await?,
                1
            );
            let mut after = contact("After", &tag);
            outer.contacts().save(&mut after).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(names_for_tag(&kit, &tag).await, vec!["After", "Before"]);
}
