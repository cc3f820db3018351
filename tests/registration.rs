// tests/registration.rs

mod common;

use std::time::Duration;

use common::*;
use expense_backend::{
    common::error::AppError,
    models::{
        approval::Outcome,
        auth::Role,
        notification::NotificationMessage,
        request::{AttachmentKind, RequestStage},
    },
    services::request_service::Registration,
};

fn with_files(invoice: bool, budget: bool) -> Registration {
    Registration {
        invoice: invoice.then(|| b"%PDF-1.7 nota".to_vec()),
        budget: budget.then(|| b"%PDF-1.7 orcamento".to_vec()),
        ..registration(&[MANAGER_A], &[DIRECTOR_A])
    }
}

#[tokio::test]
async fn registers_pending_request_and_notifies_everyone_involved() {
    let h = Harness::new();
    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), registration(&[MANAGER_A, MANAGER_B], &[DIRECTOR_A]), &token())
        .await
        .unwrap();

    assert_eq!(view.requester.id, REQUESTER);
    assert_eq!(view.company.id, COMPANY);
    assert_eq!(view.amount, 25_000);
    assert_eq!(view.overall, Outcome::Pending);
    assert_eq!(view.stage, RequestStage::AwaitingManagers);
    assert_eq!(view.managers.len(), 2);
    assert_eq!(view.directors.len(), 1);
    assert!(!view.has_invoice && !view.has_budget);
    assert_eq!(h.requests.count(), 1);

    let created = NotificationMessage::Created.text(view.id);
    let awaiting = NotificationMessage::AwaitingReview.text(view.id);
    assert_eq!(h.notifications.for_user(REQUESTER)[0].message, created);
    assert_eq!(h.notifications.for_user(MANAGER_A)[0].message, awaiting);
    assert_eq!(h.notifications.for_user(MANAGER_B)[0].message, awaiting);
    assert_eq!(h.notifications.for_user(DIRECTOR_A)[0].message, created);
    assert_eq!(
        h.transport.users_pushed(),
        vec![REQUESTER, DIRECTOR_A, MANAGER_A, MANAGER_B]
    );

    // Sinal global só dentro do tenant
    let pushes = h.transport.pushes.lock().unwrap();
    assert!(pushes.iter().any(|(t, _, _)| *t == Target::All(h.tenant)));
    assert!(pushes.iter().all(|(t, _, _)| *t != Target::All(h.other_tenant)));
}

#[tokio::test]
async fn stored_attachments_are_flagged_present() {
    let h = Harness::new();
    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), with_files(true, false), &token())
        .await
        .unwrap();

    assert!(view.has_invoice);
    assert!(!view.has_budget);

    let stored = h.requests.stored(view.id).unwrap();
    assert!(stored.invoice.present);
    assert!(!stored.budget.present);

    let writes = h.sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, stored.invoice.id);
    assert_eq!(writes[0].1, AttachmentKind::Invoice);
}

#[tokio::test]
async fn attachment_failure_does_not_fail_registration() {
    let h = Harness::new();
    *h.sink.fail.lock().unwrap() = true;

    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), with_files(true, true), &token())
        .await
        .unwrap();

    assert!(!view.has_invoice);
    assert!(!view.has_budget);
    assert!(h.requests.stored(view.id).is_some());
}

#[tokio::test]
async fn slow_attachment_is_abandoned_after_timeout() {
    let h = Harness::with_timeout(Duration::from_millis(50));
    *h.sink.delay.lock().unwrap() = Some(Duration::from_millis(500));

    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), with_files(true, false), &token())
        .await
        .unwrap();

    assert!(!view.has_invoice);
    assert!(h.requests.stored(view.id).is_some());

    // A task foi abortada: o anexo não aparece depois, fora da vista de quem chamou
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!h.requests.stored(view.id).unwrap().invoice.present);
    assert!(h.sink.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn slow_fanout_is_abandoned_after_timeout() {
    let h = Harness::with_timeout(Duration::from_millis(50));
    *h.notifications.delay.lock().unwrap() = Some(Duration::from_millis(300));

    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), registration(&[MANAGER_A], &[]), &token())
        .await
        .unwrap();
    assert_eq!(h.requests.count(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.notifications.for_request(view.id).is_empty());
    assert!(h.transport.pushes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn notification_failures_do_not_fail_registration() {
    let h = Harness::new();
    *h.notifications.fail.lock().unwrap() = true;
    *h.transport.fail.lock().unwrap() = true;

    let view = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), registration(&[MANAGER_A], &[]), &token())
        .await
        .unwrap();

    assert_eq!(view.overall, Outcome::Pending);
    assert_eq!(h.requests.count(), 1);
}

#[tokio::test]
async fn quota_exhausted_rejects_and_stores_nothing() {
    let h = Harness::new();
    h.requests.set_quota(h.tenant, 2, 3);
    let requester = h.caller(REQUESTER, Role::Requester);

    h.service
        .register(&requester, registration(&[MANAGER_A], &[]), &token())
        .await
        .unwrap();
    assert_eq!(h.requests.quota_used(h.tenant), Some(3));

    let err = h
        .service
        .register(&requester, registration(&[MANAGER_A], &[]), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded));
    assert_eq!(h.requests.count(), 1);
    assert_eq!(h.requests.quota_used(h.tenant), Some(3));
}

#[tokio::test]
async fn cancelled_before_start_stores_nothing() {
    let h = Harness::new();
    let cancel = token();
    cancel.cancel();

    let err = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), with_files(true, true), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(h.requests.count(), 0);
    assert!(h.sink.writes.lock().unwrap().is_empty());
    assert!(h.notifications.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_during_insert_stores_nothing() {
    let h = Harness::new();
    h.requests.set_insert_delay(Duration::from_millis(500));

    let cancel = token();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = h
        .service
        .register(&h.caller(REQUESTER, Role::Requester), registration(&[MANAGER_A], &[]), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(h.requests.count(), 0);
    assert!(h.notifications.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_or_foreign_company_is_not_found() {
    let h = Harness::new();
    let requester = h.caller(REQUESTER, Role::Requester);

    for company_id in [DISABLED_COMPANY, OTHER_COMPANY, 999] {
        let err = h
            .service
            .register(&requester, Registration { company_id, ..registration(&[MANAGER_A], &[]) }, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompanyNotFound(id) if id == company_id));
    }
    assert_eq!(h.requests.count(), 0);
}

#[tokio::test]
async fn approvers_must_be_enabled_local_and_in_the_right_role() {
    let h = Harness::new();
    let requester = h.caller(REQUESTER, Role::Requester);

    let cases = [
        // Gestor de outro tenant
        registration(&[OTHER_MANAGER], &[]),
        // Gestor desativado
        registration(&[DISABLED_MANAGER], &[]),
        // Diretor na lista de gestores
        registration(&[DIRECTOR_A], &[]),
        // Financeiro na lista de diretores
        registration(&[MANAGER_A], &[FINANCE]),
        // Usuário inexistente
        registration(&[MANAGER_A, 4242], &[]),
    ];

    for cmd in cases {
        let err = h.service.register(&requester, cmd, &token()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "esperado InvalidInput, veio {:?}", err);
    }
    assert_eq!(h.requests.count(), 0);
}

#[tokio::test]
async fn requester_comes_from_caller_not_payload() {
    let h = Harness::new();
    let view = h
        .service
        .register(&h.caller(MANAGER_B, Role::Manager), registration(&[MANAGER_A], &[]), &token())
        .await
        .unwrap();

    let stored = h.requests.stored(view.id).unwrap();
    assert_eq!(stored.requester_id, MANAGER_B);
    assert_eq!(stored.tenant_id, h.tenant);
}
