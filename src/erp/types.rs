use std::fmt;
use std::str::FromStr;

/// ERPNext document types the offline layer reads and creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
  Customer,
  Item,
  Quotation,
  SalesOrder,
  Task,
  LeaveApplication,
  ExpenseClaim,
  Attendance,
}

impl Entity {
  pub const ALL: [Entity; 8] = [
    Entity::Customer,
    Entity::Item,
    Entity::Quotation,
    Entity::SalesOrder,
    Entity::Task,
    Entity::LeaveApplication,
    Entity::ExpenseClaim,
    Entity::Attendance,
  ];

  /// ERPNext DocType name, as used in `/api/resource/<DocType>`.
  pub fn doctype(self) -> &'static str {
    match self {
      Entity::Customer => "Customer",
      Entity::Item => "Item",
      Entity::Quotation => "Quotation",
      Entity::SalesOrder => "Sales Order",
      Entity::Task => "Task",
      Entity::LeaveApplication => "Leave Application",
      Entity::ExpenseClaim => "Expense Claim",
      Entity::Attendance => "Attendance",
    }
  }

  /// Operation name of the list read; also the cache key prefix.
  pub fn list_op(self) -> &'static str {
    match self {
      Entity::Customer => "getCustomers",
      Entity::Item => "getItems",
      Entity::Quotation => "getQuotations",
      Entity::SalesOrder => "getSalesOrders",
      Entity::Task => "getTasks",
      Entity::LeaveApplication => "getLeaveApplications",
      Entity::ExpenseClaim => "getExpenseClaims",
      Entity::Attendance => "getAttendance",
    }
  }

  /// Operation name of the create; also the queue entry tag.
  pub fn create_op(self) -> &'static str {
    match self {
      Entity::Customer => "createCustomer",
      Entity::Item => "createItem",
      Entity::Quotation => "createQuotation",
      Entity::SalesOrder => "createSalesOrder",
      Entity::Task => "createTask",
      Entity::LeaveApplication => "createLeaveApplication",
      Entity::ExpenseClaim => "createExpenseClaim",
      Entity::Attendance => "createAttendance",
    }
  }

  /// Inverse of [`Entity::create_op`].
  pub fn from_create_op(op: &str) -> Option<Entity> {
    Self::ALL.into_iter().find(|e| e.create_op() == op)
  }
}

impl fmt::Display for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.doctype())
  }
}

/// Accepts CLI spellings: `customer`, `customers`, `sales-order`,
/// `sales_orders`, `Sales Order`, ...
impl FromStr for Entity {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized: String = s
      .trim()
      .to_lowercase()
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .collect();

    Self::ALL
      .into_iter()
      .find(|e| {
        let doctype: String = e
          .doctype()
          .to_lowercase()
          .chars()
          .filter(|c| c.is_ascii_alphanumeric())
          .collect();
        normalized == doctype || normalized.strip_suffix('s') == Some(doctype.as_str())
      })
      .ok_or_else(|| format!("unknown entity: {}", s))
  }
}
