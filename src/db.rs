use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};

use crate::models::{
    normalize_uid, Client, ClientStatus, Lesson, NewClient, NewLesson, NewPayment, Payment,
    PaymentStatus, Snapshot,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).context("invalid seed date");

    let clients = vec![
        (
            NewClient {
                uid: "AL2024".to_string(),
                full_name: "Avery Lee".to_string(),
                status: ClientStatus::Active,
                teacher: Some("Rahul".to_string()),
                email: Some("avery.lee@example.com".to_string()),
                telephone: Some("416-555-0142".to_string()),
                lead_source: Some("Referral".to_string()),
                notes: None,
            },
            vec![("10-pack", "10", "500.00", date(2024, 1, 8)?)],
            vec![
                ("1.5", date(2024, 1, 15)?, "Quadratic functions"),
                ("2.0", date(2024, 1, 22)?, "Essay structure"),
            ],
        ),
        (
            NewClient {
                uid: "JM2023".to_string(),
                full_name: "Jules Moreno".to_string(),
                status: ClientStatus::Active,
                teacher: Some("Priya".to_string()),
                email: Some("jules.moreno@example.com".to_string()),
                telephone: None,
                lead_source: Some("Website".to_string()),
                notes: Some("Prefers evening sessions".to_string()),
            },
            vec![("5-pack", "5", "275.00", date(2023, 11, 2)?)],
            vec![
                ("1.0", date(2023, 11, 9)?, "Chemistry lab report"),
                ("1.0", date(2023, 11, 16)?, "Stoichiometry"),
                ("1.0", date(2023, 11, 23)?, "Exam review"),
                ("3.0", date(2023, 12, 1)?, "Exam review"),
            ],
        ),
        (
            NewClient {
                uid: "KP2022".to_string(),
                full_name: "Kiara Patel".to_string(),
                status: ClientStatus::Inactive,
                teacher: Some("Rahul".to_string()),
                email: None,
                telephone: Some("647-555-0177".to_string()),
                lead_source: None,
                notes: None,
            },
            vec![("Single", "1", "60.00", date(2022, 9, 14)?)],
            vec![("1.0", date(2022, 9, 21)?, "General")],
        ),
    ];

    let mut inserted = 0usize;
    for (client, payments, lessons) in clients {
        let created: Option<i64> = sqlx::query(
            r#"
            INSERT INTO tutoring.clients
            (uid, full_name, status, teacher, email, telephone, lead_source, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (uid) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&client.uid)
        .bind(&client.full_name)
        .bind(client.status.as_str())
        .bind(&client.teacher)
        .bind(&client.email)
        .bind(&client.telephone)
        .bind(&client.lead_source)
        .bind(&client.notes)
        .fetch_optional(pool)
        .await?
        .map(|row| row.get("id"));

        if created.is_none() {
            continue;
        }
        inserted += 1;

        for (package, hours, amount, paid_on) in payments {
            let amount: Decimal = amount.parse()?;
            let (hst, total) = crate::stats::calculate_tax(amount, true);
            insert_payment(
                pool,
                &NewPayment {
                    client_uid: client.uid.clone(),
                    payment_date: Some(paid_on),
                    package_type: Some(package.to_string()),
                    hours_purchased: Some(hours.parse()?),
                    amount_paid: Some(amount),
                    hourly_rate: None,
                    amount_owing_pretax: None,
                    apply_tax: true,
                    hst_amount: Some(hst),
                    total_payment: Some(total),
                    status: PaymentStatus::Paid,
                    payment_method: Some("e-transfer".to_string()),
                    year: Some(chrono::Datelike::year(&paid_on)),
                    notes: None,
                },
            )
            .await?;
        }

        for (hours, taught_on, topic) in lessons {
            insert_lesson(
                pool,
                &NewLesson {
                    client_uid: client.uid.clone(),
                    lesson_date: Some(taught_on),
                    hours_taught: Some(hours.parse()?),
                    teacher: client.teacher.clone(),
                    lesson_topic: Some(topic.to_string()),
                    paid_or_probono: "paid".to_string(),
                    paid_teacher: None,
                    notes: None,
                },
            )
            .await?;
        }
    }

    Ok(inserted)
}

fn client_from_row(row: &PgRow) -> sqlx::Result<Client> {
    Ok(Client {
        id: row.try_get("id")?,
        uid: row.try_get("uid")?,
        full_name: row.try_get("full_name")?,
        status: ClientStatus::parse(row.try_get("status")?),
        teacher: row.try_get("teacher")?,
        email: row.try_get("email")?,
        telephone: row.try_get("telephone")?,
        lead_source: row.try_get("lead_source")?,
        notes: row.try_get("notes")?,
    })
}

fn payment_from_row(row: &PgRow) -> sqlx::Result<Payment> {
    Ok(Payment {
        id: row.try_get("id")?,
        client_uid: row.try_get("uid")?,
        client_name: row.try_get("full_name")?,
        payment_date: row.try_get("payment_date")?,
        package_type: row.try_get("package_type")?,
        hours_purchased: row.try_get("hours_purchased")?,
        amount_paid: row.try_get("amount_paid")?,
        hourly_rate: row.try_get("hourly_rate")?,
        amount_owing_pretax: row.try_get("amount_owing_pretax")?,
        apply_tax: row.try_get("apply_tax")?,
        hst_amount: row.try_get("hst_amount")?,
        total_payment: row.try_get("total_payment")?,
        status: PaymentStatus::parse(row.try_get("status")?),
        payment_method: row.try_get("payment_method")?,
        year: row.try_get("year")?,
        notes: row.try_get("notes")?,
    })
}

fn lesson_from_row(row: &PgRow) -> sqlx::Result<Lesson> {
    Ok(Lesson {
        id: row.try_get("id")?,
        client_uid: row.try_get("uid")?,
        client_name: row.try_get("full_name")?,
        lesson_date: row.try_get("lesson_date")?,
        hours_taught: row.try_get("hours_taught")?,
        teacher: row.try_get("teacher")?,
        lesson_topic: row.try_get("lesson_topic")?,
        paid_or_probono: row.try_get("paid_or_probono")?,
        paid_teacher: row.try_get("paid_teacher")?,
        notes: row.try_get("notes")?,
    })
}

pub async fn fetch_clients<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Client>> {
    let rows = sqlx::query(
        "SELECT id, uid, full_name, status, teacher, email, telephone, lead_source, notes \
         FROM tutoring.clients ORDER BY full_name ASC",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(client_from_row).collect::<sqlx::Result<Vec<_>>>()?)
}

pub async fn fetch_payments<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Payment>> {
    let rows = sqlx::query(
        "SELECT p.id, c.uid, c.full_name, p.payment_date, p.package_type, p.hours_purchased, \
         p.amount_paid, p.hourly_rate, p.amount_owing_pretax, p.apply_tax, p.hst_amount, \
         p.total_payment, p.status, p.payment_method, p.year, p.notes \
         FROM tutoring.payments p \
         JOIN tutoring.clients c ON c.id = p.client_id \
         ORDER BY p.payment_date DESC NULLS LAST, p.id DESC",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(payment_from_row).collect::<sqlx::Result<Vec<_>>>()?)
}

pub async fn fetch_lessons<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Lesson>> {
    let rows = sqlx::query(
        "SELECT l.id, c.uid, c.full_name, l.lesson_date, l.hours_taught, l.teacher, \
         l.lesson_topic, l.paid_or_probono, l.paid_teacher, l.notes \
         FROM tutoring.lessons l \
         JOIN tutoring.clients c ON c.id = l.client_id \
         ORDER BY l.lesson_date DESC NULLS LAST, l.id DESC",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(lesson_from_row).collect::<sqlx::Result<Vec<_>>>()?)
}

/// Reads all three tables inside one repeatable-read transaction so the
/// collections agree with each other.
pub async fn fetch_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;

    let clients = fetch_clients(&mut *tx).await?;
    let payments = fetch_payments(&mut *tx).await?;
    let lessons = fetch_lessons(&mut *tx).await?;
    tx.commit().await?;

    tracing::debug!(
        clients = clients.len(),
        payments = payments.len(),
        lessons = lessons.len(),
        "loaded snapshot"
    );
    Ok(Snapshot {
        clients,
        payments,
        lessons,
    })
}

pub async fn client_exists(pool: &PgPool, uid: &str) -> anyhow::Result<bool> {
    let exists: bool =
        sqlx::query("SELECT EXISTS (SELECT 1 FROM tutoring.clients WHERE uid = $1) AS found")
            .bind(normalize_uid(uid))
            .fetch_one(pool)
            .await?
            .get("found");
    Ok(exists)
}

async fn insert_client_row<'e, E: PgExecutor<'e>>(
    executor: E,
    client: &NewClient,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tutoring.clients
        (uid, full_name, status, teacher, email, telephone, lead_source, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (uid) DO NOTHING
        "#,
    )
    .bind(normalize_uid(&client.uid))
    .bind(&client.full_name)
    .bind(client.status.as_str())
    .bind(&client.teacher)
    .bind(&client.email)
    .bind(&client.telephone)
    .bind(&client.lead_source)
    .bind(&client.notes)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_payment_row<'e, E: PgExecutor<'e>>(
    executor: E,
    payment: &NewPayment,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tutoring.payments
        (client_id, payment_date, package_type, hours_purchased, amount_paid, hourly_rate,
         amount_owing_pretax, apply_tax, hst_amount, total_payment, status, payment_method,
         year, notes)
        SELECT c.id, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
        FROM tutoring.clients c
        WHERE c.uid = $1
        "#,
    )
    .bind(normalize_uid(&payment.client_uid))
    .bind(payment.payment_date)
    .bind(&payment.package_type)
    .bind(payment.hours_purchased)
    .bind(payment.amount_paid)
    .bind(payment.hourly_rate)
    .bind(payment.amount_owing_pretax)
    .bind(payment.apply_tax)
    .bind(payment.hst_amount)
    .bind(payment.total_payment)
    .bind(payment.status.as_str())
    .bind(&payment.payment_method)
    .bind(payment.year)
    .bind(&payment.notes)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_lesson_row<'e, E: PgExecutor<'e>>(
    executor: E,
    lesson: &NewLesson,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tutoring.lessons
        (client_id, lesson_date, hours_taught, teacher, lesson_topic, paid_or_probono,
         paid_teacher, notes)
        SELECT c.id, $2, $3, $4, $5, $6, $7, $8
        FROM tutoring.clients c
        WHERE c.uid = $1
        "#,
    )
    .bind(normalize_uid(&lesson.client_uid))
    .bind(lesson.lesson_date)
    .bind(lesson.hours_taught)
    .bind(&lesson.teacher)
    .bind(&lesson.lesson_topic)
    .bind(&lesson.paid_or_probono)
    .bind(lesson.paid_teacher)
    .bind(&lesson.notes)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_client(pool: &PgPool, client: &NewClient) -> anyhow::Result<bool> {
    Ok(insert_client_row(pool, client).await? > 0)
}

pub async fn insert_payment(pool: &PgPool, payment: &NewPayment) -> anyhow::Result<bool> {
    Ok(insert_payment_row(pool, payment).await? > 0)
}

pub async fn insert_lesson(pool: &PgPool, lesson: &NewLesson) -> anyhow::Result<bool> {
    Ok(insert_lesson_row(pool, lesson).await? > 0)
}

pub async fn insert_clients(pool: &PgPool, batch: &[NewClient]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for client in batch {
        inserted += insert_client_row(&mut *tx, client).await? as usize;
    }
    tx.commit().await.context("failed to commit client batch")?;
    Ok(inserted)
}

pub async fn insert_payments(pool: &PgPool, batch: &[NewPayment]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for payment in batch {
        inserted += insert_payment_row(&mut *tx, payment).await? as usize;
    }
    tx.commit().await.context("failed to commit payment batch")?;
    Ok(inserted)
}

pub async fn insert_lessons(pool: &PgPool, batch: &[NewLesson]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for lesson in batch {
        inserted += insert_lesson_row(&mut *tx, lesson).await? as usize;
    }
    tx.commit().await.context("failed to commit lesson batch")?;
    Ok(inserted)
}

pub async fn update_client(pool: &PgPool, uid: &str, client: &NewClient) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tutoring.clients
        SET uid = $2, full_name = $3, status = $4, teacher = $5, email = $6,
            telephone = $7, lead_source = $8, notes = $9, updated_at = now()
        WHERE uid = $1
        "#,
    )
    .bind(normalize_uid(uid))
    .bind(normalize_uid(&client.uid))
    .bind(&client.full_name)
    .bind(client.status.as_str())
    .bind(&client.teacher)
    .bind(&client.email)
    .bind(&client.telephone)
    .bind(&client.lead_source)
    .bind(&client.notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a client; its payments and lessons go with it.
pub async fn delete_client(pool: &PgPool, uid: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM tutoring.clients WHERE uid = $1")
        .bind(normalize_uid(uid))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_payment(pool: &PgPool, id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM tutoring.payments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_lesson(pool: &PgPool, id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM tutoring.lessons WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
