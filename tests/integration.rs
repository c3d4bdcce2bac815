//! End-to-end tests against a temporary SQLite database.

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use keywatch::config::Config;
use keywatch::error::Error;
use keywatch::ident::Id;
use keywatch::models::{CategoryMention, EntityMention, IndexType, MentionSource};
use keywatch::Engine;

async fn setup_engine() -> (TempDir, Engine) {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("keywatch.sqlite"));

    let engine = Engine::connect(&config).await.unwrap();
    engine.migrate().await.unwrap();

    (tmp, engine)
}

fn at_minutes(minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(minutes * 60, 0).unwrap()
}

// ============ Keyword registry ============

#[tokio::test]
async fn test_add_keyword_rejects_unsupported_language() {
    let (_tmp, engine) = setup_engine().await;

    let err = engine
        .keywords
        .add_keyword("acme", "tlh", "alice")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedLanguage(_)));
}

#[tokio::test]
async fn test_add_keyword_membership_is_idempotent() {
    let (_tmp, engine) = setup_engine().await;

    engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();

    assert_eq!(
        keyword.users,
        vec!["alice".to_string()],
        "adding the same user twice must leave one membership"
    );
    assert!(!keyword.deleted);
}

#[tokio::test]
async fn test_get_keyword_membership_filter() {
    let (_tmp, engine) = setup_engine().await;

    engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();

    let as_alice = engine
        .keywords
        .get_keyword("acme", "en", Some("alice"))
        .await
        .unwrap();
    assert!(as_alice.is_some());

    let as_stranger = engine
        .keywords
        .get_keyword("acme", "en", Some("mallory"))
        .await
        .unwrap();
    assert!(as_stranger.is_none(), "non-members must not see the keyword");

    let unfiltered = engine.keywords.get_keyword("acme", "en", None).await.unwrap();
    assert!(unfiltered.is_some());
}

#[tokio::test]
async fn test_get_keyword_by_id_absent() {
    let (_tmp, engine) = setup_engine().await;

    let found = engine.keywords.get_keyword_by_id(Id::new(), None).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_identity_resolution_rejects_malformed_ids() {
    let (_tmp, engine) = setup_engine().await;

    let err = engine
        .keywords
        .get_keyword_by_id("definitely-not-an-id", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidIdentifier(_)));
}

#[tokio::test]
async fn test_reference_counted_deletion() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();

    // Removing a non-member is a no-op that leaves the flag alone
    let modified = engine
        .keywords
        .delete_keyword(keyword.id, "mallory")
        .await
        .unwrap();
    assert_eq!(modified, 0);
    let after = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!after.deleted);

    // Removing the sole member empties the set and flips the flag
    let modified = engine
        .keywords
        .delete_keyword(keyword.id, "alice")
        .await
        .unwrap();
    assert_eq!(modified, 1);
    let after = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(after.users.is_empty());
    assert!(after.deleted, "emptied membership must mark the keyword deleted");
}

#[tokio::test]
async fn test_shared_keyword_lifecycle() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    engine.keywords.add_keyword("acme", "en", "bob").await.unwrap();

    let bobs = engine.keywords.get_keywords_for_user("bob").await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].id, keyword.id);

    let shared = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(shared.users.contains(&"alice".to_string()));
    assert!(shared.users.contains(&"bob".to_string()));

    engine.keywords.delete_keyword(keyword.id, "alice").await.unwrap();
    let after_alice = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!after_alice.deleted, "bob still holds a reference");

    engine.keywords.delete_keyword(keyword.id, "bob").await.unwrap();
    let after_bob = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(after_bob.deleted);
}

#[tokio::test]
async fn test_index_links_are_idempotent_and_revive() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let index_id = Id::new();

    let linked = engine
        .keywords
        .add_index_to_keyword(keyword.id, index_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked.indexes, vec![index_id]);

    let relinked = engine
        .keywords
        .add_index_to_keyword(keyword.id, index_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relinked.indexes.len(), 1, "duplicate link must not grow the set");

    // With the user gone the index reference alone keeps the keyword alive
    engine.keywords.delete_keyword(keyword.id, "alice").await.unwrap();
    let kept = engine
        .keywords
        .get_keyword_by_id(keyword.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!kept.deleted);

    let unlinked = engine
        .keywords
        .delete_index_from_keyword(keyword.id, index_id)
        .await
        .unwrap()
        .unwrap();
    assert!(unlinked.indexes.is_empty());
    assert!(unlinked.deleted, "both sets empty now");
}

#[tokio::test]
async fn test_index_link_missing_keyword_is_noop() {
    let (_tmp, engine) = setup_engine().await;

    let linked = engine
        .keywords
        .add_index_to_keyword(Id::new(), Id::new())
        .await
        .unwrap();
    assert!(linked.is_none());

    let unlinked = engine
        .keywords
        .delete_index_from_keyword(Id::new(), Id::new())
        .await
        .unwrap();
    assert!(unlinked.is_none());
}

#[tokio::test]
async fn test_get_keywords_by_index() {
    let (_tmp, engine) = setup_engine().await;

    let index_id = Id::new();
    let first = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let second = engine.keywords.add_keyword("globex", "en", "alice").await.unwrap();
    engine.keywords.add_keyword("initech", "en", "alice").await.unwrap();

    engine
        .keywords
        .add_index_to_keyword(first.id, index_id)
        .await
        .unwrap();
    engine
        .keywords
        .add_index_to_keyword(second.id, index_id)
        .await
        .unwrap();

    let linked = engine.keywords.get_keywords_by_index(index_id).await.unwrap();
    assert_eq!(linked.len(), 2);
}

#[tokio::test]
async fn test_public_keywords_tolerate_dangling_ids() {
    let (_tmp, engine) = setup_engine().await;

    // Uninitialised meta yields an empty list, not an error
    let none = engine.keywords.get_public_keywords().await.unwrap();
    assert!(none.is_empty());

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let dangling = Id::new();
    engine
        .meta
        .set_public_keyword_ids(&[keyword.id, dangling])
        .await
        .unwrap();

    let public = engine.keywords.get_public_keywords().await.unwrap();
    assert_eq!(public.len(), 1, "dangling allowlist ids are dropped silently");
    assert_eq!(public[0].id, keyword.id);
}

#[tokio::test]
async fn test_keyword_batch_pages_through_all_keywords() {
    let (_tmp, engine) = setup_engine().await;

    for i in 0..5 {
        engine
            .keywords
            .add_keyword(&format!("keyword {i}"), "en", "alice")
            .await
            .unwrap();
    }

    let mut seen = 0;
    let mut after = None;
    loop {
        let batch = engine.keywords.keyword_batch(after, 2).await.unwrap();
        if batch.is_empty() {
            break;
        }
        seen += batch.len();
        after = Some(batch.last().unwrap().id);
    }

    assert_eq!(seen, 5);
}

// ============ Index registry ============

#[tokio::test]
async fn test_add_index_create_then_join() {
    let (_tmp, engine) = setup_engine().await;

    let created = engine
        .indexes
        .add_index("tech", IndexType::Branch, "alice")
        .await
        .unwrap();
    assert_eq!(created.users, vec!["alice".to_string()]);
    assert!(!created.deleted);

    let joined = engine
        .indexes
        .add_index("tech", IndexType::Branch, "bob")
        .await
        .unwrap();
    assert_eq!(joined.id, created.id);
    assert_eq!(joined.users.len(), 2);

    let by_id = engine
        .indexes
        .get_index_by_id(created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_id.name, "tech");
    assert_eq!(by_id.index_type, IndexType::Branch);
}

#[tokio::test]
async fn test_index_type_boundary_validation() {
    let err = "CONGLOMERATE".parse::<IndexType>().unwrap_err();
    assert!(matches!(err, Error::UnsupportedIndexType(_)));
}

#[tokio::test]
async fn test_get_indexes_by_type_filters_by_membership() {
    let (_tmp, engine) = setup_engine().await;

    engine
        .indexes
        .add_index("sp500", IndexType::Market, "alice")
        .await
        .unwrap();
    engine
        .indexes
        .add_index("rivals", IndexType::Competition, "alice")
        .await
        .unwrap();
    engine
        .indexes
        .add_index("dax", IndexType::Market, "bob")
        .await
        .unwrap();

    let markets = engine
        .indexes
        .get_indexes_by_type(IndexType::Market, "alice")
        .await
        .unwrap();
    assert_eq!(markets.len(), 1);
    assert_eq!(markets[0].name, "sp500");

    let all = engine.indexes.get_indexes("alice").await.unwrap();
    assert_eq!(all.len(), 2);
}

// ============ Mention store ============

#[tokio::test]
async fn test_ingest_upsert_preserves_annotations() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let mention = engine
        .mentions
        .add_twitter(keyword.id, 42, "first crawl", 1, 0, at_minutes(0))
        .await
        .unwrap();

    engine.mentions.set_score(mention.id, 0.8).await.unwrap();
    let entities = vec![EntityMention {
        value: "Acme Corp".to_string(),
        count: 2,
        score: 0.5,
    }];
    engine.mentions.set_entities(mention.id, &entities).await.unwrap();

    // Re-crawl the same tweet: ingest fields update, annotations survive
    let recrawled = engine
        .mentions
        .add_twitter(keyword.id, 42, "second crawl", 7, 3, at_minutes(5))
        .await
        .unwrap();

    assert_eq!(recrawled.id, mention.id, "natural key must update, not duplicate");
    assert_eq!(recrawled.text, "second crawl");
    assert_eq!(recrawled.timestamp, at_minutes(5).timestamp());
    assert_eq!(recrawled.score, Some(0.8), "re-ingest must not clobber the score");
    assert_eq!(recrawled.entities, entities);
    match recrawled.source {
        MentionSource::Twitter { likes, retweets, .. } => {
            assert_eq!(likes, 7);
            assert_eq!(retweets, 3);
        }
        other => panic!("expected a twitter mention, got {other:?}"),
    }
}

#[tokio::test]
async fn test_news_upsert_by_composite_key() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let first = engine
        .mentions
        .add_news(keyword.id, "jane doe", "acme rising", "body v1", at_minutes(0))
        .await
        .unwrap();
    let second = engine
        .mentions
        .add_news(keyword.id, "jane doe", "acme rising", "body v2", at_minutes(1))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.text, "body v2");

    // A different title is a different article
    let other = engine
        .mentions
        .add_news(keyword.id, "jane doe", "acme falling", "body", at_minutes(2))
        .await
        .unwrap();
    assert_ne!(other.id, first.id);
}

#[tokio::test]
async fn test_unprocessed_mentions_and_scoring_transition() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let first = engine
        .mentions
        .add_twitter(keyword.id, 1, "one", 0, 0, at_minutes(0))
        .await
        .unwrap();
    engine
        .mentions
        .add_nyt(keyword.id, "nyt-1", "two", at_minutes(1))
        .await
        .unwrap();

    let pending = engine.mentions.get_unprocessed_mentions(None).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(
        pending[0].keyword_string.as_deref(),
        Some("acme"),
        "parent keyword fields are joined in"
    );

    let capped = engine.mentions.get_unprocessed_mentions(Some(1)).await.unwrap();
    assert_eq!(capped.len(), 1);

    engine.mentions.set_score(first.id, 0.4).await.unwrap();
    let remaining = engine.mentions.get_unprocessed_mentions(None).await.unwrap();
    assert_eq!(remaining.len(), 1, "scored mentions leave the pending set");
}

#[tokio::test]
async fn test_get_mention_by_id_joins_keyword() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "de", "alice").await.unwrap();
    let mention = engine
        .mentions
        .add_nyt(keyword.id, "nyt-9", "ein text", at_minutes(0))
        .await
        .unwrap();

    let found = engine
        .mentions
        .get_mention_by_id(mention.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.keyword_string.as_deref(), Some("acme"));
    assert_eq!(found.language.as_deref(), Some("de"));
    assert_eq!(found.keyword_ref, keyword.id);

    let absent = engine.mentions.get_mention_by_id(Id::new()).await.unwrap();
    assert!(absent.is_none());
}

// ============ Analytics pipeline ============

#[tokio::test]
async fn test_plotting_data_buckets_scored_mentions() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    for (i, minute) in [0i64, 32, 62, 92].iter().enumerate() {
        let mention = engine
            .mentions
            .add_twitter(keyword.id, i as i64, "text", 0, 0, at_minutes(*minute))
            .await
            .unwrap();
        engine.mentions.set_score(mention.id, 1.0).await.unwrap();
    }

    let trend = engine
        .analytics
        .get_plotting_data(keyword.id, None, 60)
        .await
        .unwrap();

    assert_eq!(trend.len(), 2, "62 > 0+60 opens the second bucket");
    assert_eq!(trend[0].count, 2);
    assert_eq!(trend[0].timestamp, at_minutes(0).timestamp());
    assert_eq!(trend[1].count, 2);
    assert_eq!(trend[1].timestamp, at_minutes(62).timestamp());
    assert!((trend[0].score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_plotting_data_excludes_unscored_and_cutoff() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let early = engine
        .mentions
        .add_twitter(keyword.id, 1, "early", 0, 0, at_minutes(0))
        .await
        .unwrap();
    engine.mentions.set_score(early.id, 0.2).await.unwrap();
    let late = engine
        .mentions
        .add_twitter(keyword.id, 2, "late", 0, 0, at_minutes(500))
        .await
        .unwrap();
    engine.mentions.set_score(late.id, 0.6).await.unwrap();
    // Unscored mention never shows up in the trend
    engine
        .mentions
        .add_twitter(keyword.id, 3, "unscored", 0, 0, at_minutes(501))
        .await
        .unwrap();

    let all = engine
        .analytics
        .get_plotting_data(keyword.id, None, 60)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let recent = engine
        .analytics
        .get_plotting_data(keyword.id, Some(at_minutes(400)), 60)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].timestamp, at_minutes(500).timestamp());
}

#[tokio::test]
async fn test_plotting_data_empty_keyword() {
    let (_tmp, engine) = setup_engine().await;

    let trend = engine
        .analytics
        .get_plotting_data(Id::new(), None, 60)
        .await
        .unwrap();
    assert!(trend.is_empty(), "no scored mentions yields an empty trend");
}

#[tokio::test]
async fn test_average_score_ignores_unscored() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();

    let none = engine.analytics.get_average_score(keyword.id).await.unwrap();
    assert!(none.is_none());

    let scored = engine
        .mentions
        .add_twitter(keyword.id, 1, "scored", 0, 0, at_minutes(0))
        .await
        .unwrap();
    engine.mentions.set_score(scored.id, 0.8).await.unwrap();
    engine
        .mentions
        .add_twitter(keyword.id, 2, "unscored", 0, 0, at_minutes(1))
        .await
        .unwrap();

    let average = engine
        .analytics
        .get_average_score(keyword.id)
        .await
        .unwrap()
        .unwrap();
    assert!(
        (average - 0.8).abs() < 1e-9,
        "unscored mentions must not drag the mean toward zero"
    );
}

#[tokio::test]
async fn test_entity_roll_up_across_mentions() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let first = engine
        .mentions
        .add_twitter(keyword.id, 1, "one", 0, 0, at_minutes(0))
        .await
        .unwrap();
    let second = engine
        .mentions
        .add_twitter(keyword.id, 2, "two", 0, 0, at_minutes(1))
        .await
        .unwrap();

    engine
        .mentions
        .set_entities(
            first.id,
            &[EntityMention {
                value: "X".to_string(),
                count: 2,
                score: 0.5,
            }],
        )
        .await
        .unwrap();
    engine
        .mentions
        .set_entities(
            second.id,
            &[
                EntityMention {
                    value: "X".to_string(),
                    count: 3,
                    score: 0.9,
                },
                EntityMention {
                    value: "Y".to_string(),
                    count: 1,
                    score: 0.1,
                },
            ],
        )
        .await
        .unwrap();

    let rolled = engine.analytics.get_entities(keyword.id, None).await.unwrap();
    assert_eq!(rolled.len(), 2);
    assert_eq!(rolled[0].value, "X");
    assert_eq!(rolled[0].count, 5);
    assert!((rolled[0].score - 0.7).abs() < 1e-9, "mean of 0.5 and 0.9");

    let capped = engine.analytics.get_entities(keyword.id, Some(1)).await.unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].value, "X");
}

#[tokio::test]
async fn test_category_roll_up() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let mention = engine
        .mentions
        .add_nyt(keyword.id, "nyt-1", "text", at_minutes(0))
        .await
        .unwrap();

    engine
        .mentions
        .set_categories(
            mention.id,
            &[
                CategoryMention {
                    value: "/business".to_string(),
                    count: 1,
                    confidence: 0.9,
                },
                CategoryMention {
                    value: "/business".to_string(),
                    count: 2,
                    confidence: 0.7,
                },
            ],
        )
        .await
        .unwrap();

    let rolled = engine
        .analytics
        .get_categories(keyword.id, None)
        .await
        .unwrap();
    assert_eq!(rolled.len(), 1, "duplicate values within one mention merge too");
    assert_eq!(rolled[0].count, 3);
    assert!((rolled[0].confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_texts_export_newest_first() {
    let (_tmp, engine) = setup_engine().await;

    let keyword = engine.keywords.add_keyword("acme", "en", "alice").await.unwrap();
    let old = engine
        .mentions
        .add_twitter(keyword.id, 1, "old", 0, 0, at_minutes(0))
        .await
        .unwrap();
    engine.mentions.set_score(old.id, 0.3).await.unwrap();
    engine
        .mentions
        .add_twitter(keyword.id, 2, "new", 0, 0, at_minutes(10))
        .await
        .unwrap();

    let texts = engine.analytics.get_texts(keyword.id).await.unwrap();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].text, "new");
    assert_eq!(texts[0].score, None);
    assert_eq!(texts[1].text, "old");
    assert_eq!(texts[1].score, Some(0.3));
}

// ============ Meta registry ============

#[tokio::test]
async fn test_meta_initialisation_lifecycle() {
    let (_tmp, engine) = setup_engine().await;

    assert!(!engine.meta.is_meta_initialised().await.unwrap());

    let err = engine.meta.get_public_keyword_ids().await.unwrap_err();
    assert!(matches!(err, Error::MetaUninitialized));

    let ids = vec![Id::new(), Id::new()];
    engine.meta.set_public_keyword_ids(&ids).await.unwrap();

    assert!(engine.meta.is_meta_initialised().await.unwrap());
    assert_eq!(engine.meta.get_public_keyword_ids().await.unwrap(), ids);

    // Replace, not merge
    let replacement = vec![Id::new()];
    engine.meta.set_public_keyword_ids(&replacement).await.unwrap();
    assert_eq!(
        engine.meta.get_public_keyword_ids().await.unwrap(),
        replacement
    );
}

// ============ User registry ============

#[tokio::test]
async fn test_user_round_trip() {
    let (_tmp, engine) = setup_engine().await;

    let added = engine.users.add_user("alice", "pbkdf2$deadbeef").await.unwrap();

    let found = engine.users.get_user("alice").await.unwrap().unwrap();
    assert_eq!(found.id, added.id);
    assert_eq!(found.password_hash, "pbkdf2$deadbeef");

    assert!(engine.users.get_user("nobody").await.unwrap().is_none());

    let duplicate = engine.users.add_user("alice", "other").await;
    assert!(matches!(duplicate, Err(Error::Database(_))));
}
