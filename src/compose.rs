//! Outbound SMS text for each step of the dispatch protocol
//!
//! Pure functions: same inputs, byte-identical text.

use crate::ride::RideRequest;

/// Currency label shown next to fares
pub const FARE_UNIT: &str = "ETH";

fn trip_details(ride: &RideRequest) -> String {
    format!(
        "Pickup: {}\nDropoff: {}\nRider: {}\nFare: {} {}",
        ride.pickup_location,
        ride.dropoff_location,
        ride.rider_name,
        ride.fare_display(),
        FARE_UNIT
    )
}

fn command_forms(ride_id: &str) -> String {
    format!("ACCEPT {id}\nIGNORE {id}", id = ride_id)
}

/// Sent to the driver when a rider requests a ride
pub fn compose_new_request(ride: &RideRequest) -> String {
    format!(
        "New ride request!\n\n{}\nRide ID: {}\n\nReply ACCEPT {id} to take this ride or IGNORE {id} to pass.",
        trip_details(ride),
        ride.id,
        id = ride.id
    )
}

/// Confirmation after the driver accepts
pub fn compose_accepted(ride: &RideRequest) -> String {
    format!(
        "Ride {} accepted.\n\n{}\n\nNext steps: head to the pickup location now and contact the rider when you arrive. \
         Payment is released when the trip is completed.",
        ride.id,
        trip_details(ride)
    )
}

/// Acknowledgment after the driver declines
pub fn compose_declined(ride: &RideRequest) -> String {
    format!(
        "Ride {} declined.\n\n{}\n\nNo further action is needed. The rider will be told the ride is unavailable.",
        ride.id,
        trip_details(ride)
    )
}

/// Help text when the reply names a known ride but no valid action
pub fn compose_invalid_command(raw_body: &str, ride_id: &str) -> String {
    format!(
        "Sorry, \"{}\" is not a valid reply.\n\nTo respond to ride {}, reply with one of:\n{}",
        raw_body.trim(),
        ride_id,
        command_forms(ride_id)
    )
}

/// Error text when the reply names no ride, or one that is not live
pub fn compose_ride_not_found(raw_body: &str, ride_id: Option<&str>) -> String {
    let subject = match ride_id {
        Some(id) => format!("Ride {} was not found. It may have expired or been mistyped.", id),
        None => "That reply did not include a ride ID.".to_string(),
    };
    format!(
        "{}\n\nYou sent: \"{}\"\nReply with ACCEPT <ride id> or IGNORE <ride id>.",
        subject,
        raw_body.trim()
    )
}
