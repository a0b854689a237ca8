/// Landing pages for the hosted-checkout redirects. The state machine's
/// outcome is what matters; these are the user-visible confirmation shells.

pub fn payment_success_page(price: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Payment successful</title>
</head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4rem;">
  <h1>Thank you!</h1>
  <p>Your payment of <strong>${price}</strong> was received.</p>
  <p>Your subscription is now active. You can return to the app.</p>
</body>
</html>"#
    )
}

pub const PAYMENT_CANCEL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Payment cancelled</title>
</head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4rem;">
  <h1>Payment cancelled</h1>
  <p>No charge was made. You can try again any time.</p>
</body>
</html>"#;

pub const PAYMENT_FAILED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Payment failed</title>
</head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4rem;">
  <h1>Payment failed</h1>
  <p>We could not confirm this payment. If you were charged, contact support.</p>
</body>
</html>"#;
