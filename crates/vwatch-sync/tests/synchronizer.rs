mod support;

use support::{at, listing, subscription, FakeMarketplace, Harness, Scripted};
use vwatch_adapters::SearchPage;
use vwatch_storage::SubscriptionStore;
use vwatch_sync::SyncOutcome;

#[tokio::test]
async fn cold_subscription_announces_only_the_newest_listing() {
    let sub = subscription(1, "S1", 100, None);
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace.items("S1", vec![listing(1, 100), listing(2, 200)]);

    let outcome = h.synchronizer.sync_subscription(&sub, true).await;

    assert_eq!(
        outcome,
        SyncOutcome::Announced {
            announced: 1,
            watermark: at(200),
            watermark_persisted: true,
        }
    );
    assert_eq!(h.notifier.titles_for(100), vec!["item 2"]);
    assert_eq!(h.watermark(1).await, Some(at(200)));
}

#[tokio::test]
async fn cold_subscription_outside_first_sync_still_gets_one_listing() {
    let sub = subscription(1, "S1", 100, None);
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace
        .items("S1", vec![listing(1, 100), listing(3, 300), listing(2, 200)]);

    h.synchronizer.sync_subscription(&sub, false).await;

    assert_eq!(h.notifier.titles_for(100), vec!["item 3"]);
    assert_eq!(h.watermark(1).await, Some(at(300)));
}

#[tokio::test]
async fn warm_subscription_announces_new_listings_oldest_first() {
    let sub = subscription(2, "S2", 200, Some(200));
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace
        .items("S2", vec![listing(3, 300), listing(1, 150), listing(2, 250)]);

    let outcome = h.synchronizer.sync_subscription(&sub, false).await;

    assert_eq!(
        outcome,
        SyncOutcome::Announced {
            announced: 2,
            watermark: at(300),
            watermark_persisted: true,
        }
    );
    assert_eq!(h.notifier.titles_for(200), vec!["item 2", "item 3"]);
    assert_eq!(h.watermark(2).await, Some(at(300)));
}

#[tokio::test]
async fn warm_subscription_during_first_sync_gets_one_listing() {
    let sub = subscription(2, "S2", 200, Some(200));
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace
        .items("S2", vec![listing(3, 300), listing(2, 250)]);

    h.synchronizer.sync_subscription(&sub, true).await;

    assert_eq!(h.notifier.titles_for(200), vec!["item 3"]);
    assert_eq!(h.watermark(2).await, Some(at(300)));
}

#[tokio::test]
async fn nothing_newer_than_watermark_has_no_side_effects() {
    let sub = subscription(2, "S2", 200, Some(300));
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace
        .items("S2", vec![listing(3, 300), listing(1, 100)]);

    let outcome = h.synchronizer.sync_subscription(&sub, false).await;

    assert_eq!(outcome, SyncOutcome::NothingNew);
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.watermark(2).await, Some(at(300)));
}

#[tokio::test]
async fn failed_search_leaves_watermark_and_chat_untouched() {
    let sub = subscription(2, "S2", 200, Some(200));
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace.respond("S2", Scripted::Fail);

    let outcome = h.synchronizer.sync_subscription(&sub, false).await;

    assert_eq!(outcome, SyncOutcome::SearchFailed);
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.watermark(2).await, Some(at(200)));
}

#[tokio::test]
async fn response_without_items_leaves_watermark_and_chat_untouched() {
    let sub = subscription(2, "S2", 200, None);
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace
        .respond("S2", Scripted::Page(SearchPage::empty_response()));

    let outcome = h.synchronizer.sync_subscription(&sub, true).await;

    assert_eq!(outcome, SyncOutcome::EmptyResponse);
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.watermark(2).await, None);
}

#[tokio::test]
async fn watermark_write_failure_is_reported_but_listings_still_go_out() {
    let sub = subscription(2, "S2", 200, Some(200));
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace.items("S2", vec![listing(3, 300)]);
    h.store.set_failing_writes(true);

    let outcome = h.synchronizer.sync_subscription(&sub, false).await;

    assert_eq!(
        outcome,
        SyncOutcome::Announced {
            announced: 1,
            watermark: at(300),
            watermark_persisted: false,
        }
    );
    assert_eq!(h.notifier.titles_for(200), vec!["item 3"]);
    assert_eq!(h.watermark(2).await, Some(at(200)));
}

#[tokio::test]
async fn one_failing_subscription_does_not_block_the_others() {
    let broken = subscription(1, "broken", 100, Some(100));
    let healthy = subscription(2, "healthy", 200, Some(100));
    let undeliverable = subscription(3, "undeliverable", 300, Some(100));
    let h = Harness::new(vec![broken.clone(), healthy.clone(), undeliverable.clone()]);
    h.marketplace.respond("broken", Scripted::Fail);
    h.marketplace
        .items("healthy", vec![listing(20, 200), listing(21, 210)]);
    h.marketplace.items("undeliverable", vec![listing(30, 300)]);
    h.notifier.fail_channel(300);

    let report = h
        .synchronizer
        .run_cycle(&[broken, healthy, undeliverable], false)
        .await;

    assert_eq!(report.subscriptions, 3);
    assert_eq!(report.failed_searches, 1);
    assert_eq!(report.announced, 3);
    assert_eq!(h.notifier.titles_for(200), vec!["item 20", "item 21"]);
    assert_eq!(h.watermark(2).await, Some(at(210)));
    // Delivery failure does not roll the watermark back.
    assert_eq!(h.watermark(3).await, Some(at(300)));
}

#[tokio::test]
async fn notices_carry_subscription_footer_and_buy_link() {
    let sub = subscription(9, "S9", 900, None);
    let h = Harness::new(vec![sub.clone()]);
    h.marketplace.items("S9", vec![listing(77, 500)]);

    h.synchronizer.sync_subscription(&sub, true).await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    let (channel, notice) = &sent[0];
    assert_eq!(*channel, 900);
    assert_eq!(notice.footer, "Article lié à la recherche : 9");
    assert_eq!(notice.timestamp, at(500));
    assert!(notice.actions[1].url.ends_with("transaction%5Bitem_id%5D=77"));
}

#[tokio::test]
async fn repeated_cycles_never_move_the_watermark_backwards() {
    let sub = subscription(1, "S1", 100, Some(500));
    let h = Harness::with_marketplace(FakeMarketplace::new(), vec![sub]);
    h.marketplace
        .items("S1", vec![listing(1, 400), listing(2, 450)]);

    for _ in 0..3 {
        let current = h.store.find_active().await.unwrap();
        h.synchronizer.run_cycle(&current, false).await;
    }

    assert_eq!(h.watermark(1).await, Some(at(500)));
    assert!(h.notifier.sent().is_empty());
}
