use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::{ItemKey, PpmpStatus, ProjectType, UserType};
use crate::workflow::WorkflowAction;

pub mod commands;

pub use commands::{run, CliContext};

#[derive(Parser)]
#[command(name = "ppmp-planner")]
#[command(about = "Procurement planning and PPMP approval workflow")]
#[command(long_about = "Drafts Project Procurement Management Plans, routes them through unit head, \
                       budget, BAC and HOPE review, and spins purchase requests off approved rows. \
                       State is kept in a JSON snapshot between invocations.")]
pub struct Cli {
    /// JSON snapshot to load and save (defaults to storage.data_file)
    #[arg(long, global = true, help = "Snapshot file holding all planner records")]
    pub data: Option<PathBuf>,

    /// Acting user
    #[arg(long = "as", global = true, value_name = "USER_ID", help = "User id to act as")]
    pub actor: Option<i64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage schools
    School {
        #[command(subcommand)]
        command: UnitCommands,
    },
    /// Manage division offices
    Office {
        #[command(subcommand)]
        command: UnitCommands,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Create, list and inspect PPMPs
    Ppmp {
        #[command(subcommand)]
        command: PpmpCommands,
    },
    /// Edit and review PPMP rows
    Row {
        #[command(subcommand)]
        command: RowCommands,
    },
    /// Move a PPMP along the approval workflow
    Transition {
        ppmp_id: i64,
        /// submit-to-unit-head, submit-to-budget, submit-to-bac, submit-to-hope,
        /// approve, return, return-to-budget, return-to-bac, return-to-unit-head, revise
        action: WorkflowAction,
        #[arg(long, help = "Remark recorded with the transition (required for returns)")]
        remark: Option<String>,
    },
    /// List the actions the acting user may take on a PPMP
    Actions { ppmp_id: i64 },
    /// Show the audit history of a PPMP
    History { ppmp_id: i64 },
    /// BAC sign-off
    Bac {
        #[command(subcommand)]
        command: BacCommands,
    },
    /// Annual Procurement Plan
    App {
        #[command(subcommand)]
        command: AppCommands,
    },
    /// Purchase requests
    Pr {
        #[command(subcommand)]
        command: PrCommands,
    },
    /// Show the acting user's notifications
    Notifications {
        #[arg(long, help = "Only unread notifications")]
        unread: bool,
        #[arg(long, value_name = "ID", help = "Mark a notification as read")]
        mark_read: Option<i64>,
        #[arg(long, help = "Mark every notification as read")]
        mark_all: bool,
    },
}

#[derive(Subcommand)]
pub enum UnitCommands {
    /// Add a school or office
    Add {
        name: String,
        #[arg(long, value_name = "USER_ID", help = "Unit head")]
        head: Option<i64>,
    },
    /// List schools or offices
    List,
    /// Change the unit head
    SetHead {
        id: i64,
        #[arg(value_name = "USER_ID")]
        head: Option<i64>,
    },
    /// Delete a school or office that nothing references
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user account
    Add {
        name: String,
        email: String,
        /// e.g. "school head", "budget officer", "bac member"
        #[arg(long = "type", value_name = "TYPE")]
        user_type: UserType,
        #[arg(long)]
        designation: Option<String>,
        #[arg(long, value_name = "SCHOOL_ID")]
        school: Option<i64>,
        #[arg(long, value_name = "OFFICE_ID")]
        office: Option<i64>,
    },
    /// List user accounts
    List {
        #[arg(long, help = "Only active accounts")]
        active: bool,
    },
    /// Deactivate an account
    Deactivate { id: i64 },
    /// Reactivate an account
    Activate { id: i64 },
    /// Delete an account that nothing references
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum PpmpCommands {
    /// Start a draft PPMP for a school or office
    Create {
        #[arg(long, help = "Fiscal year (defaults to planning.current_fiscal_year)")]
        fiscal_year: Option<i32>,
        #[arg(long, value_name = "SCHOOL_ID", conflicts_with = "office")]
        school: Option<i64>,
        #[arg(long, value_name = "OFFICE_ID")]
        office: Option<i64>,
    },
    /// List PPMPs
    List {
        #[arg(long)]
        fiscal_year: Option<i32>,
        #[arg(long)]
        status: Vec<PpmpStatus>,
        #[arg(long, help = "Only PPMPs created by the acting user")]
        mine: bool,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Show a PPMP with its rows and remarks
    Show { id: i64 },
    /// Delete a draft PPMP
    Delete { id: i64 },
    /// PPMPs waiting on the acting user
    Submissions {
        #[arg(long, default_value = "1")]
        page: usize,
    },
}

#[derive(Subcommand)]
pub enum RowCommands {
    /// Add a row to a PPMP
    Add {
        ppmp_id: i64,
        #[arg(long)]
        description: String,
        #[arg(long = "type", value_name = "TYPE", default_value = "goods")]
        project_type: ProjectType,
        /// LOT:DESCRIPTION[:QUANTITY[:UNIT[:COST]]], repeatable
        #[arg(long = "item", value_name = "ITEM")]
        items: Vec<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long, help = "Procurement start, YYYY-MM or YYYY-MM-DD")]
        start: Option<String>,
        #[arg(long, help = "Procurement end, YYYY-MM or YYYY-MM-DD")]
        end: Option<String>,
        #[arg(long)]
        funds: Option<String>,
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long = "remark")]
        remarks: Vec<String>,
    },
    /// Change a row; omitted options keep their current value
    Update {
        row_id: i64,
        #[arg(long)]
        description: Option<String>,
        /// Replaces every lot when given
        #[arg(long = "item", value_name = "ITEM")]
        items: Vec<String>,
        #[arg(long)]
        funds: Option<String>,
        #[arg(long)]
        budget: Option<f64>,
    },
    /// List the rows of a PPMP
    List { ppmp_id: i64 },
    /// Delete a row
    Delete { row_id: i64 },
    /// Attach files to a row
    Attach {
        row_id: i64,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Approve a row for the APP
    Approve { row_id: i64 },
    /// Send a row back to pending
    Pending { row_id: i64 },
    /// Add a threaded remark to a row
    Remark { row_id: i64, text: String },
}

#[derive(Subcommand)]
pub enum BacCommands {
    /// Record the acting BAC member's approval
    Approve { ppmp_id: i64 },
    /// Show who has signed off
    Status { ppmp_id: i64 },
}

#[derive(Subcommand)]
pub enum AppCommands {
    /// Show the APP gate for a fiscal year
    Status {
        #[arg(long)]
        fiscal_year: Option<i32>,
    },
    /// Approve the APP (HOPE only)
    Approve {
        #[arg(long)]
        fiscal_year: Option<i32>,
    },
    /// List APP rows
    Rows {
        #[arg(long)]
        fiscal_year: Option<i32>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
}

#[derive(Subcommand)]
pub enum PrCommands {
    /// Create a purchase request from selected row items
    Create {
        row_id: i64,
        /// LOT-ITEM, zero based, repeatable
        #[arg(long = "item", value_name = "LOT-ITEM", required = true)]
        items: Vec<ItemKey>,
    },
    /// Items of a row still free for a purchase request
    Available { row_id: i64 },
    /// List purchase requests
    List {
        #[arg(long, help = "Only requests created by the acting user")]
        mine: bool,
    },
}
