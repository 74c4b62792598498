use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use textile_booking_api::{
    auth::{AuthConfig, AuthService, AuthUser},
    checkout::{
        client::ClientFailure, BookingClient, CheckoutMachine, CheckoutState, ClientError,
        FileDescriptorStore, PendingPaymentDescriptor,
    },
    config,
    services::{
        bookings::{BookingResponse, StartBookingRequest},
        payments::{VerifyPaymentRequest, VerifyPaymentResponse},
    },
};
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_tracing(&cli.log_level, false);

    let json = cli.json;
    let client = cli.connection.client()?;
    let result = match cli.command {
        Commands::Catalog => handle_catalog(&client, json).await,
        Commands::Book(args) => handle_book(&client, args, json).await,
        Commands::Bookings(command) => handle_bookings(&client, command, json).await,
        Commands::Pay(args) => handle_pay(&cli.connection, &client, args, json).await,
        Commands::Verify(args) => handle_verify(&cli.connection, &client, args, json).await,
        Commands::Resume => handle_resume(&cli.connection, json),
        Commands::Abandon => handle_abandon(&cli.connection, &client, json).await,
        Commands::Status => handle_status(&cli.connection, json),
        Commands::IssueToken(args) => handle_issue_token(args, json),
    };

    if let Err(err) = &result {
        if json {
            if let Some(client_err) = err.downcast_ref::<ClientError>() {
                print_json(&ClientFailure::from(client_err))?;
            }
        }
    }
    result
}

#[derive(Parser)]
#[command(
    name = "textile",
    about = "Book textile processing work and pay for it from the terminal",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(
        long,
        global = true,
        env = "TEXTILE_LOG",
        default_value = "warn",
        help = "Log level for client diagnostics"
    )]
    log_level: String,
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    #[arg(
        long,
        global = true,
        env = "TEXTILE_API_URL",
        default_value = "http://localhost:8080",
        help = "Base URL of the booking API"
    )]
    base_url: String,
    #[arg(
        long,
        global = true,
        env = "TEXTILE_API_TOKEN",
        hide_env_values = true,
        help = "Bearer token sent with every request"
    )]
    token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "TEXTILE_DESCRIPTOR_FILE",
        help = "Where the pending payment is kept between runs (default ~/.textile/pending_payment.json)"
    )]
    descriptor_file: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = 30, help = "Request timeout in seconds")]
    timeout_secs: u64,
}

impl ConnectionArgs {
    fn client(&self) -> Result<BookingClient> {
        let client = BookingClient::new(&self.base_url, Duration::from_secs(self.timeout_secs))
            .context("failed to build HTTP client")?;
        Ok(match &self.token {
            Some(token) => client.with_token(token),
            None => client,
        })
    }

    fn checkout(&self) -> Result<CheckoutMachine<FileDescriptorStore>> {
        let path = match &self.descriptor_file {
            Some(path) => path.clone(),
            None => default_descriptor_path()?,
        };
        debug!(path = %path.display(), "loading pending payment descriptor");
        CheckoutMachine::load(FileDescriptorStore::new(path))
            .context("failed to read pending payment descriptor")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List processing rates
    Catalog,
    /// Start a new booking
    Book(BookArgs),
    #[command(subcommand)]
    Bookings(BookingsCommands),
    /// Open a gateway order for a pending booking and keep it as the pending payment
    Pay(PayArgs),
    /// Send the checkout result for the pending payment to the server
    Verify(VerifyArgs),
    /// Show the checkout details of the pending payment again
    Resume,
    /// Cancel the booking behind the pending payment and forget it
    Abandon,
    /// Show whether a payment is pending
    Status,
    /// Mint a bearer token with the server's configured secret
    IssueToken(IssueTokenArgs),
}

#[derive(Subcommand)]
enum BookingsCommands {
    List(ListBookingsArgs),
    Get(GetBookingArgs),
}

#[derive(Args)]
struct BookArgs {
    #[arg(long, help = "Process category (sizing or weaving)")]
    category: String,
    #[arg(long, help = "Material name as listed in the catalog")]
    material: String,
    #[arg(long, help = "Quantity in kilograms")]
    quantity: Decimal,
    #[arg(long, help = "Free-form notes for the mill")]
    notes: Option<String>,
}

#[derive(Args)]
struct ListBookingsArgs {
    #[arg(long, help = "Only bookings in this status")]
    status: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 20)]
    per_page: u64,
}

#[derive(Args)]
struct GetBookingArgs {
    #[arg(help = "Booking id")]
    id: Uuid,
}

#[derive(Args)]
struct PayArgs {
    #[arg(help = "Booking id to pay for")]
    booking_id: Uuid,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long, help = "Payment id reported by the checkout widget")]
    gateway_payment_id: String,
    #[arg(long, help = "Signature reported by the checkout widget")]
    signature: String,
}

#[derive(Args)]
struct IssueTokenArgs {
    #[arg(long, help = "Subject of the token")]
    user_id: String,
    #[arg(long, help = "Display name carried in the token")]
    name: Option<String>,
    #[arg(long = "role", help = "Role to grant; repeat for several")]
    roles: Vec<String>,
}

async fn handle_catalog(client: &BookingClient, json: bool) -> Result<()> {
    let entries = client.catalog().await?;
    if json {
        return print_json(&entries);
    }
    for entry in entries {
        println!(
            "- {} • {} • {} per kg",
            entry.process_category, entry.material, entry.unit_rate
        );
    }
    Ok(())
}

async fn handle_book(client: &BookingClient, args: BookArgs, json: bool) -> Result<()> {
    let request = StartBookingRequest {
        process_category: args.category,
        material: args.material,
        quantity: args.quantity,
        notes: args.notes,
        total: None,
    };
    let booking = client.start_booking(&request).await?;
    if json {
        print_json(&booking)
    } else {
        println!("Booking created");
        render_booking(&booking);
        println!("Next: textile pay {}", booking.id);
        Ok(())
    }
}

async fn handle_bookings(
    client: &BookingClient,
    command: BookingsCommands,
    json: bool,
) -> Result<()> {
    match command {
        BookingsCommands::List(args) => {
            if args.per_page == 0 {
                return Err(anyhow!("per-page must be greater than zero"));
            }
            let page = client
                .list_bookings(args.status.as_deref(), args.page, args.per_page)
                .await?;
            if json {
                return print_json(&page);
            }
            if page.items.is_empty() {
                println!("No bookings found");
            }
            for booking in &page.items {
                render_booking(booking);
            }
            println!("Page {} of {} ({} total)", page.page, page.total_pages, page.total);
            Ok(())
        }
        BookingsCommands::Get(args) => {
            let booking = client.get_booking(args.id).await?;
            if json {
                print_json(&booking)
            } else {
                render_booking(&booking);
                Ok(())
            }
        }
    }
}

async fn handle_pay(
    connection: &ConnectionArgs,
    client: &BookingClient,
    args: PayArgs,
    json: bool,
) -> Result<()> {
    let mut machine = connection.checkout()?;
    if let Some(existing) = machine.state().descriptor() {
        bail!(
            "a payment for booking {} is already pending; run `textile resume` or `textile abandon` first",
            existing.booking_id
        );
    }

    let booking = client.get_booking(args.booking_id).await?;
    let handoff = client
        .create_gateway_order(booking.id, booking.total)
        .await?;
    let descriptor = machine.order_created(&handoff)?;

    if json {
        print_json(&descriptor)
    } else {
        println!("Gateway order opened for booking {}", booking.id);
        render_descriptor(&descriptor);
        println!("Complete checkout, then run: textile verify --gateway-payment-id <id> --signature <sig>");
        Ok(())
    }
}

async fn handle_verify(
    connection: &ConnectionArgs,
    client: &BookingClient,
    args: VerifyArgs,
    json: bool,
) -> Result<()> {
    let mut machine = connection.checkout()?;
    // A descriptor left by an earlier run loads as resumable.
    if matches!(machine.state(), CheckoutState::Resumable(_)) {
        machine.resume()?;
    }
    let descriptor = machine
        .state()
        .descriptor()
        .cloned()
        .ok_or_else(|| anyhow!("no payment is pending; run `textile pay <booking-id>` first"))?;

    let request = VerifyPaymentRequest {
        gateway_order_id: Some(descriptor.gateway_order_id.clone()),
        gateway_payment_id: Some(args.gateway_payment_id),
        gateway_signature: Some(args.signature),
        payment_id: Some(descriptor.payment_id),
        booking_id: Some(descriptor.booking_id),
    };
    // Any error leaves the descriptor in place so the verification can be retried.
    let response = client.verify_payment(&request).await?;
    machine.outcome_verified()?;

    if json {
        print_json(&response)
    } else {
        render_verification(&response);
        Ok(())
    }
}

fn handle_resume(connection: &ConnectionArgs, json: bool) -> Result<()> {
    let mut machine = connection.checkout()?;
    let descriptor = machine.resume()?;
    if json {
        print_json(&descriptor)
    } else {
        println!("Resuming checkout for booking {}", descriptor.booking_id);
        render_descriptor(&descriptor);
        Ok(())
    }
}

async fn handle_abandon(
    connection: &ConnectionArgs,
    client: &BookingClient,
    json: bool,
) -> Result<()> {
    let mut machine = connection.checkout()?;
    let booking_id = match machine.state() {
        CheckoutState::Resumable(descriptor) => descriptor.booking_id,
        other => bail!("nothing to abandon ({})", other.name()),
    };

    // Cancel first: if this fails the descriptor is still there to retry or verify.
    let booking = client.cancel_booking(booking_id).await.with_context(|| {
        format!(
            "could not cancel booking {}; if checkout went through, run `textile verify` instead",
            booking_id
        )
    })?;
    machine.abandon()?;

    if json {
        print_json(&booking)
    } else {
        println!("Pending payment abandoned");
        render_booking(&booking);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    state: &'static str,
    descriptor: Option<&'a PendingPaymentDescriptor>,
}

fn handle_status(connection: &ConnectionArgs, json: bool) -> Result<()> {
    let machine = connection.checkout()?;
    let state = machine.state();
    if json {
        return print_json(&StatusOutput {
            state: state.name(),
            descriptor: state.descriptor(),
        });
    }
    match state.descriptor() {
        Some(descriptor) => {
            println!("Pending payment ({})", state.name());
            render_descriptor(descriptor);
        }
        None => println!("No pending payment"),
    }
    Ok(())
}

fn handle_issue_token(args: IssueTokenArgs, json: bool) -> Result<()> {
    let cfg = config::load_config().context("failed to load application config")?;
    let auth = AuthService::new(AuthConfig::from(&cfg));
    let user = AuthUser {
        user_id: args.user_id,
        name: args.name,
        email: None,
        roles: args.roles,
    };
    let token = auth
        .issue_token(&user)
        .map_err(|e| anyhow!("failed to issue token: {}", e))?;

    if json {
        print_json(&serde_json::json!({ "user_id": user.user_id, "token": token }))
    } else {
        println!("{}", token);
        Ok(())
    }
}

fn default_descriptor_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .context("HOME is not set; pass --descriptor-file to choose where to keep the pending payment")?;
    let mut path = PathBuf::from(home);
    path.push(".textile");
    path.push("pending_payment.json");
    Ok(path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_booking(booking: &BookingResponse) {
    println!(
        "- Booking {} • {} {} • {} kg @ {} • total {} • {}",
        booking.id,
        booking.process_category,
        booking.material,
        booking.quantity,
        booking.unit_rate,
        booking.total,
        booking.status
    );
}

fn render_descriptor(descriptor: &PendingPaymentDescriptor) {
    println!("  gateway order: {}", descriptor.gateway_order_id);
    println!(
        "  amount:        {} {} (minor units)",
        descriptor.amount_minor_units, descriptor.currency
    );
    println!("  key:           {}", descriptor.key);
    println!("  payment id:    {}", descriptor.payment_id);
    println!("  opened at:     {}", descriptor.created_at.to_rfc3339());
}

fn render_verification(response: &VerifyPaymentResponse) {
    println!(
        "Payment {} verified as {}",
        response.payment.id, response.status
    );
    render_booking(&response.booking);
    if let Some(conflict) = &response.conflict {
        println!(
            "Warning: payment could not be applied to the booking ({}); an operator has been alerted",
            conflict.kind
        );
    }
}
