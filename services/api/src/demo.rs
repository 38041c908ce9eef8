use crate::infra::{
    seed_demo_data, InMemoryAttendeeStore, InMemoryEventStore, InMemoryUserStore, DEMO_ADMIN,
    DEMO_CONCIERGE, DEMO_EVENT, DEMO_MARKETER, DEMO_PHONE,
};
use clap::Args;
use eventdesk::error::AppError;
use eventdesk::workflows::registration::{
    CheckInService, ConciergeAssignmentService, EventId, EventStore, ParticipationCoordinator,
    PhoneNumber, ReviewDecision, UserId, UserStore,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the stored documents as JSON after the walkthrough
    #[arg(long)]
    pub(crate) dump_state: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let events = Arc::new(InMemoryEventStore::default());
    let users = Arc::new(InMemoryUserStore::default());
    let attendees = Arc::new(InMemoryAttendeeStore::default());
    seed_demo_data(&events, &users, &attendees)?;

    let participation = ParticipationCoordinator::new(events.clone(), users.clone());
    let assignments = ConciergeAssignmentService::new(events.clone(), users.clone());
    let checkin = CheckInService::new(events.clone(), attendees.clone());

    let event_id = EventId(DEMO_EVENT.to_string());
    let marketer = UserId(DEMO_MARKETER.to_string());
    let concierge = UserId(DEMO_CONCIERGE.to_string());
    let admin = UserId(DEMO_ADMIN.to_string());
    let phone = PhoneNumber(DEMO_PHONE.to_string());

    println!("Event registration desk demo");

    println!("\nMarketer participation");
    let view = match participation.join(&event_id, &marketer) {
        Ok(view) => view,
        Err(err) => {
            println!("  Join failed: {err}");
            return Ok(());
        }
    };
    println!("- {} joined {} -> marketers: {:?}", marketer, event_id, view.marketers);
    match participation.join(&event_id, &marketer) {
        Ok(view) => println!(
            "- Repeat join is a no-op success ({} marketer(s) on record)",
            view.marketers.len()
        ),
        Err(err) => println!("  Repeat join failed: {err}"),
    }

    println!("\nConcierge assignment");
    let request = match assignments.request(&event_id, &concierge) {
        Ok(view) => view,
        Err(err) => {
            println!("  Request failed: {err}");
            return Ok(());
        }
    };
    println!("- {} filed request {} -> status {}", concierge, request.id, request.status);
    match assignments.request(&event_id, &concierge) {
        Err(err) => println!("- Duplicate request rejected: {err}"),
        Ok(_) => println!("- Duplicate request unexpectedly accepted"),
    }

    let reviewed = match assignments.review(&event_id, &request.id, ReviewDecision::Approve, &admin)
    {
        Ok(view) => view,
        Err(err) => {
            println!("  Review failed: {err}");
            return Ok(());
        }
    };
    println!(
        "- {} approved request {} at {}",
        admin,
        reviewed.id,
        reviewed
            .reviewed_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );
    match assignments.review(&event_id, &request.id, ReviewDecision::Reject, &admin) {
        Err(err) => println!("- Re-review rejected: {err}"),
        Ok(_) => println!("- Re-review unexpectedly accepted"),
    }

    match assignments.my_status(&event_id, &concierge) {
        Ok(status) => println!("- Status for {}: {}", concierge, status.status),
        Err(err) => println!("  Status lookup failed: {err}"),
    }

    println!("\nAttendee check-in");
    match checkin.check_in(&event_id, &phone, &concierge) {
        Ok(receipt) => println!(
            "- {} checked in attendee {} at {}",
            receipt.checked_in_by,
            receipt.attendee,
            receipt.checked_in_time.to_rfc3339()
        ),
        Err(err) => {
            println!("  Check-in failed: {err}");
            return Ok(());
        }
    }
    match checkin.check_in(&event_id, &phone, &concierge) {
        Err(err) => println!("- Second check-in rejected: {err}"),
        Ok(_) => println!("- Second check-in unexpectedly accepted"),
    }

    println!("\nDesk projections");
    match assignments.list_approved() {
        Ok(listings) => {
            for listing in &listings {
                println!(
                    "- approved: {} on {} ({})",
                    listing.user.id,
                    listing.event.id,
                    listing.user.name.as_deref().unwrap_or("unknown user")
                );
            }
            if listings.is_empty() {
                println!("- approved: none");
            }
        }
        Err(err) => println!("  Listing failed: {err}"),
    }
    match participation.reconcile() {
        Ok(report) => println!(
            "- reconcile: {} event(s), {} user(s), {} back-reference(s) repaired",
            report.scanned_events,
            report.scanned_users,
            report.added_backrefs + report.removed_backrefs
        ),
        Err(err) => println!("  Reconcile failed: {err}"),
    }

    if args.dump_state {
        println!("\nStored documents");
        match events.scan() {
            Ok(docs) => match serde_json::to_string_pretty(&docs) {
                Ok(json) => println!("Events:\n{json}"),
                Err(err) => println!("  Event dump unavailable: {err}"),
            },
            Err(err) => println!("  Event scan failed: {err}"),
        }
        match users.scan() {
            Ok(docs) => match serde_json::to_string_pretty(&docs) {
                Ok(json) => println!("Users:\n{json}"),
                Err(err) => println!("  User dump unavailable: {err}"),
            },
            Err(err) => println!("  User scan failed: {err}"),
        }
    }

    Ok(())
}
